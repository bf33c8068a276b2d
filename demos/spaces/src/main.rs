mod app;

use log::error;

use app::App;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = App::new().and_then(|mut app| app.run());
    if let Err(error) = result {
        error!("demo failed: {}", error);
        std::process::exit(1);
    }
}
