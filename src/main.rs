use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use jukebox::{
    audio::{registry::SessionRegistry, voice::SongbirdConnector},
    bot::JukeboxBot,
    config::Config,
    sources::{DirectUrlProbe, SourceResolver, SpotifyScraper, YtDlpProvider},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("⚙️ {}", config.summary());

    // Fuentes de audio
    let probe = DirectUrlProbe::new(config.ffprobe_path.clone(), config.http_timeout())?;
    let provider = YtDlpProvider::new(config.ytdlp_path.clone(), probe);
    let spotify = SpotifyScraper::new(config.http_timeout())?;
    let resolver = SourceResolver::new(Arc::new(provider))
        .with_catalog(Arc::new(spotify))
        .with_search_candidates(config.search_candidates);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let registry = Arc::new(SessionRegistry::new(
        SongbirdConnector::new(songbird.clone()),
        Arc::new(resolver),
        config.session_settings(),
    ));

    // Construir cliente
    let handler = JukeboxBot::new(config.clone(), registry.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando sesiones...");
        registry.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffprobe = async_process::Command::new(&config.ffprobe_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffprobe.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
