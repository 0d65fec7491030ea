use argh::FromArgs;
use geogenie::{
    BackendConfig, BackendKind,
    backend::{OllamaConfig, ollama},
    commands,
    prompt::presets,
    server::DEFAULT_PORT,
};
use std::{path::PathBuf, time::Duration};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_TEST_MAPS: &str = "test_maps";

#[derive(FromArgs)]
/// Geogenie command line: ask the model about maps, or talk to a running server
struct CliArgs {
    /// model backend: "ollama" or "paligemma"
    #[argh(option, default = "BackendKind::Ollama")]
    backend: BackendKind,

    /// base url of the ollama server
    #[argh(option, default = "ollama::DEFAULT_URL.to_string()")]
    ollama_url: String,

    /// model name served by ollama
    #[argh(option, short = 'm', default = "ollama::DEFAULT_MODEL.to_string()")]
    model: String,

    /// seconds to wait for a single generation
    #[argh(option, default = "ollama::DEFAULT_TIMEOUT.as_secs()")]
    timeout_secs: u64,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Guess(GuessCommand),
    Text(TextCommand),
    Batch(BatchCommand),
    Probe(ProbeCommand),
    Client(ClientCommand),
}

#[derive(FromArgs)]
/// Ask which city is at the center of one map
#[argh(subcommand, name = "guess")]
struct GuessCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// question to ask instead of the default one
    #[argh(option, short = 'p')]
    prompt: Option<String>,

    /// maximum number of new tokens
    #[argh(option, default = "100")]
    max_new_tokens: usize,

    /// print the full decoded output instead of the extracted answer
    #[argh(switch)]
    raw: bool,
}

#[derive(FromArgs)]
/// Send a text-only prompt
#[argh(subcommand, name = "text")]
struct TextCommand {
    /// text prompt to send
    #[argh(option, short = 'p', default = "presets::DEFAULT_TEXT_PROMPT.to_string()")]
    prompt: String,
}

#[derive(FromArgs)]
/// Guess every map in a folder
#[argh(subcommand, name = "batch")]
struct BatchCommand {
    /// folder holding .png, .jpg and .jpeg maps
    #[argh(option, short = 'd', default = "PathBuf::from(DEFAULT_TEST_MAPS)")]
    dir: PathBuf,
}

#[derive(FromArgs)]
/// Find an image size the model accepts
#[argh(subcommand, name = "probe")]
struct ProbeCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Upload a map to a running geogenie server
#[argh(subcommand, name = "client")]
struct ClientCommand {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// route to post to: analyze, analyze-map or analyze-map/variations
    #[argh(option, default = "String::from(\"analyze-map\")")]
    route: String,
}

fn backend_config(args: &CliArgs) -> BackendConfig {
    BackendConfig {
        kind: args.backend,
        ollama: OllamaConfig {
            base_url: args.ollama_url.clone(),
            model: args.model.clone(),
            timeout: Duration::from_secs(args.timeout_secs),
            ..Default::default()
        },
    }
}

async fn client(cmd: ClientCommand) -> Result<(), Box<dyn std::error::Error>> {
    let file_name = cmd
        .image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map.png".to_string());
    let bytes = tokio::fs::read(&cmd.image_path).await?;
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(bytes).file_name(file_name),
    );

    // format the host and port
    let addr = format!("{}:{}", cmd.host, cmd.port);

    let response = reqwest::Client::new()
        .post(format!("http://{}/{}", addr, cmd.route.trim_start_matches('/')))
        .multipart(form)
        .send()
        .await?;

    let result = response.json::<serde_json::Value>().await?;
    println!("Result: {}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: CliArgs = argh::from_env();
    let backend = backend_config(&args);
    let mut out = std::io::stdout().lock();

    let outcome = match args.command {
        Commands::Client(cmd) => return tokio::runtime::Runtime::new()?.block_on(client(cmd)),
        Commands::Guess(cmd) => backend.build().and_then(|mut model| {
            commands::guess(
                &mut model,
                &cmd.image_path,
                cmd.prompt.as_deref(),
                cmd.max_new_tokens,
                cmd.raw,
                &mut out,
            )
        }),
        Commands::Text(cmd) => backend
            .build()
            .and_then(|mut model| commands::text(&mut model, &cmd.prompt, &mut out)),
        Commands::Batch(cmd) => backend
            .build()
            .and_then(|mut model| commands::batch(&mut model, &cmd.dir, &mut out)),
        Commands::Probe(cmd) => backend
            .build()
            .and_then(|mut model| commands::probe(&mut model, &cmd.image_path, &mut out)),
    };

    outcome.map_err(|e| {
        log::error!("{e}");
        e.into()
    })
}
