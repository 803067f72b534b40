use burn_animeface::{AppArgs, MainAutoBackend, MainBackend, launch};

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let result = AppArgs::parse().and_then(|app_args| {
        log::debug!("{app_args:?}");
        launch::<MainBackend, MainAutoBackend>(&app_args)
    });
    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
