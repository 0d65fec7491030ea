use argh::FromArgs;
use geogenie::{
    BackendConfig, BackendKind, MapAnalyzer,
    backend::{OllamaConfig, ollama},
    server::{self, DEFAULT_HOST, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, ServerConfig},
};
use std::{path::PathBuf, time::Duration};

#[derive(FromArgs)]
/// Geogenie guesses where a map is pointing.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

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

    /// save each uploaded map to this path
    #[argh(option)]
    debug_image: Option<PathBuf>,

    /// maximum upload size in bytes
    #[argh(option, default = "DEFAULT_MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    let backend = BackendConfig {
        kind: args.backend,
        ollama: OllamaConfig {
            base_url: args.ollama_url,
            model: args.model,
            timeout: Duration::from_secs(args.timeout_secs),
            ..Default::default()
        },
    };

    // blocking clients must not be built on the runtime
    let model = tokio::task::spawn_blocking(move || backend.build()).await??;
    let analyzer = MapAnalyzer::from_model(model);

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        debug_image_path: args.debug_image,
        max_upload_bytes: args.max_upload_bytes,
    };
    server::serve(&config, analyzer).await?;

    Ok(())
}
