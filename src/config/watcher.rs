//! Configuration file watcher for hot reload.
//!
//! Only rates and minimums are hot-reloadable. Network, processor and
//! ledger settings are read once at startup; a change to them is logged
//! and takes effect on restart.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;
use crate::currency::{Converter, MinimumTable, PaymentValidator, RateTable};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!("Config file change detected, reloading...");
                    match load_config(&path) {
                        Ok(new_config) => {
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Swap in the hot-reloadable parts of `config`.
pub fn apply_reload(config: &AppConfig, converter: &Converter, validator: &PaymentValidator) {
    converter.reload(RateTable::with_overrides(&config.rates));
    validator.reload(MinimumTable::with_overrides(
        &config.minimums.card,
        &config.minimums.crypto_processor,
    ));
    tracing::info!(
        rates = config.rates.len(),
        card_minimums = config.minimums.card.len(),
        crypto_minimums = config.minimums.crypto_processor.len(),
        "Applied rate and minimum overrides"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{Currency, PaymentMethod};
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_reload_swaps_tables() {
        let converter = Converter::default();
        let validator = PaymentValidator::default();

        let mut config = AppConfig::default();
        config.rates.insert("ETH".to_string(), dec!(2000));
        config.minimums.card.insert("USD".to_string(), dec!(5));
        apply_reload(&config, &converter, &validator);

        assert_eq!(
            converter.convert(dec!(1), &Currency::from("ETH"), &Currency::from("USD")),
            dec!(2000)
        );
        assert_eq!(
            validator.minimum_for(&Currency::from("USD"), PaymentMethod::Card),
            dec!(5)
        );
    }
}
