//! Wiring an instance from a configuration file.

use std::io::Write;
use std::sync::Arc;

use backoffice::config::{ConfigLoader, Environment};
use backoffice::core::MemoryDatabase;
use backoffice::App;

#[tokio::test]
async fn file_config_drives_the_wiring() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
environment = "staging"

[server]
http_addr = "127.0.0.1:0"

[auth]
bot_token = "bot-secret"

[jobs]
daily_cron = "0 30 1 * * *"

[docs]
enabled = false
"#
    )
    .unwrap();

    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
    assert_eq!(config.environment, Environment::Staging);
    assert!(!config.docs_served());

    let app = App::builder(config)
        .database(Arc::new(MemoryDatabase::new()))
        .build()
        .unwrap();

    let scheduler = app.scheduler().expect("jobs are enabled by default");
    assert_eq!(scheduler.cron(), "0 30 1 * * *");
    assert!(!scheduler.is_running());
    assert_eq!(app.runner().job_names(), vec!["transaction_daily", "product_daily", "ec_daily"]);
}
