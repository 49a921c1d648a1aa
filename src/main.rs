use std::sync::Arc;

use filed_lib::config::Config;
use filed_lib::http::{self, AppState};
use filed_lib::path_safety::{PathConfinement, PathSafety};
use filed_lib::task_manager::TaskManager;

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Config::from_env();
    log::info!("confinement root: {}", config.base_dir.display());

    let path_safety = PathSafety::new(PathConfinement::new(config.base_dir.clone()));
    let task_manager = TaskManager::new();

    let state = AppState {
        config: Arc::new(config),
        path_safety,
        task_manager,
    };

    if let Err(e) = http::serve(state).await {
        log::error!("server error: {e}");
        std::process::exit(1);
    }
}
