use std::path::{Path, PathBuf};

use anyhow::Context as _;
use base64::Engine as _;
use clap::{Parser, Subcommand};

use avatarfit::{
    ComposeSettings, GenerationCache, GenerationClient, GenerationRequest, HttpTransport,
    JsonFileStore, LayerRole, NormalizedPosition, RasterImage, Session, compose,
};

#[derive(Parser, Debug)]
#[command(name = "avatarfit", version)]
struct Cli {
    /// Session state file (placement, api key, caches).
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose the avatar/outfit preview as a PNG.
    Compose(ComposeArgs),
    /// Submit a composite with a prompt and poll for the generated image.
    Generate(GenerateArgs),
    /// Store the generation API key.
    SetKey(SetKeyArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Avatar image (drawn on top, circularly clipped).
    #[arg(long)]
    avatar: PathBuf,

    /// Outfit image (contain-fitted beneath the avatar).
    #[arg(long)]
    outfit: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Canvas edge length in pixels.
    #[arg(long, default_value_t = 1024)]
    size: u32,

    /// Move the avatar layer to a normalized "x,y" position (clamped).
    #[arg(long, value_name = "X,Y")]
    move_avatar: Option<String>,

    /// Move the outfit layer to a normalized "x,y" position (clamped).
    #[arg(long, value_name = "X,Y")]
    move_outfit: Option<String>,

    /// Restore the default placement before composing.
    #[arg(long)]
    reset_positions: bool,

    /// Disable the avatar drop shadow.
    #[arg(long)]
    no_shadow: bool,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Prompt describing the desired output.
    #[arg(long)]
    prompt: String,

    /// Input composite PNG (e.g. produced by `compose`).
    #[arg(long)]
    input: PathBuf,

    /// API key; stored for later runs when given.
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Parser, Debug)]
struct SetKeyArgs {
    /// API key for the generation endpoint.
    #[arg(long)]
    api_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let state_path = state_path(cli.state)?;

    match cli.cmd {
        Command::Compose(args) => cmd_compose(&state_path, args),
        Command::Generate(args) => cmd_generate(&state_path, args).await,
        Command::SetKey(args) => cmd_set_key(&state_path, args),
    }
}

fn state_path(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    let base = dirs::config_dir().context("resolve config directory")?;
    Ok(base.join("avatarfit").join("state.json"))
}

fn open_session(state_path: &Path) -> anyhow::Result<Session<JsonFileStore>> {
    let store = JsonFileStore::open(state_path)?;
    Ok(Session::load(store)?)
}

fn cmd_compose(state_path: &Path, args: ComposeArgs) -> anyhow::Result<()> {
    let mut session = open_session(state_path)?;

    if args.reset_positions {
        session.reset_positions()?;
    }
    if let Some(raw) = args.move_avatar.as_deref() {
        session.move_layer(LayerRole::Base, parse_position(raw)?)?;
    }
    if let Some(raw) = args.move_outfit.as_deref() {
        session.move_layer(LayerRole::Overlay, parse_position(raw)?)?;
    }

    let avatar = RasterImage::from_path(&args.avatar)?;
    let outfit = RasterImage::from_path(&args.outfit)?;

    let mut settings = ComposeSettings::default();
    if args.no_shadow {
        settings.shadow = None;
    }

    let result = compose(
        &avatar,
        &outfit,
        &session.layer(LayerRole::Base),
        &session.layer(LayerRole::Overlay),
        args.size,
        &settings,
    )?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &result.png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

async fn cmd_generate(state_path: &Path, args: GenerateArgs) -> anyhow::Result<()> {
    let mut session = open_session(state_path)?;

    if let Some(key) = args.api_key.as_deref() {
        session.set_api_key(key)?;
    }
    let api_key = session
        .api_key()
        .ok_or_else(|| anyhow::anyhow!("no api key configured; pass --api-key or run set-key"))?;

    let png = std::fs::read(&args.input)
        .with_context(|| format!("read input '{}'", args.input.display()))?;
    let input_image = base64::engine::general_purpose::STANDARD.encode(&png);

    let client = GenerationClient::new(HttpTransport::new(api_key));
    let request = GenerationRequest {
        prompt: args.prompt.clone(),
        input_image: input_image.clone(),
    };

    let url = client
        .generate(&request, |status| {
            eprintln!("status: {}", status.as_str());
        })
        .await?;

    session.save_generation_cache(
        &GenerationCache {
            input_image_base64: input_image,
            generated_image_url: url.clone(),
            prompt: args.prompt,
        },
        chrono::Utc::now(),
    )?;

    println!("{url}");
    Ok(())
}

fn cmd_set_key(state_path: &Path, args: SetKeyArgs) -> anyhow::Result<()> {
    let mut session = open_session(state_path)?;
    session.set_api_key(&args.api_key)?;
    eprintln!("stored api key in {}", state_path.display());
    Ok(())
}

fn parse_position(raw: &str) -> anyhow::Result<NormalizedPosition> {
    let (x, y) = raw
        .split_once(',')
        .with_context(|| format!("expected 'x,y', got '{raw}'"))?;
    let x: f64 = x.trim().parse().with_context(|| format!("parse x in '{raw}'"))?;
    let y: f64 = y.trim().parse().with_context(|| format!("parse y in '{raw}'"))?;
    Ok(NormalizedPosition::new(x, y))
}
