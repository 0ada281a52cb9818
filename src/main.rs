use std::error::Error;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wolfy::bilibili::{LiveSession, OpenPlatformClient, RemoteSignatory, SessionConfig};
use wolfy::config::{AppConfig, INBOUND_QUEUE_CAPACITY};
use wolfy::maimai::{CatalogueLoader, JsonCatalogueLoader};
use wolfy::queue::{JsonFileStore, MessageBoard, QueueConfig, TicketMaster};
use wolfy::Dispatcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    config.validate()?;
    log::info!("Runtime directory: {}", config.runtime_dir.display());

    // カタログ
    let mut loader = JsonCatalogueLoader::new(config.songs_path())?.with_aliases(config.aliases_path());
    if let Some(url) = &config.alias_list_url {
        loader = loader.with_alias_list_url(url.clone());
    }
    let catalogue = Arc::new(loader.load_all().await?);

    // キュー
    let queue_config = QueueConfig {
        max_size: config.max_queue_size,
        quota: config.quota,
        super_admin: config.super_admin.clone(),
    };
    let master = Arc::new(TicketMaster::new(
        catalogue,
        JsonFileStore::new(config.checkpoint_path()),
        queue_config,
    )?);
    let board = Arc::new(MessageBoard::default());
    let dispatcher = Dispatcher::new(master, board);

    // キャンセル（Ctrl+C）
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            log::info!("Shutting down");
            cancel.cancel();
        });
    }

    // 弾幕セッション
    let signatory = RemoteSignatory::new(config.signatory_addr.clone(), config.anchor_code.clone())?;
    let client = OpenPlatformClient::new(signatory)?;
    let (tx, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    let session = LiveSession::new(client, SessionConfig::new(config.anchor_code.clone(), config.app_id), tx);

    let (session_result, ()) = tokio::join!(
        async {
            let result = session.run(&cancel).await;
            // セッションが終わったらディスパッチャも止める
            cancel.cancel();
            result
        },
        dispatcher.run(rx, &cancel),
    );

    if let Err(e) = session_result {
        log::error!("Live session ended with error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
