//! Contracts served by every back-office instance.

use anyhow::Context as _;
use backoffice_core::ContractRegistry;
use backoffice_server::HandlerRegistry;

pub mod announcement;
pub mod daily_calculate;
pub mod store_status;

/// Registers the built-in contracts and their handlers.
///
/// `dailyCalculate` resolves the job runner from the dispatcher's service
/// registry.
pub fn register(contracts: &mut ContractRegistry, handlers: &mut HandlerRegistry) -> anyhow::Result<()> {
    contracts
        .register(announcement::contract()?)
        .context("registering announcement contract")?;
    handlers.register(announcement::NAME, announcement::ReadAnnouncement)?;

    contracts
        .register(store_status::contract()?)
        .context("registering store status contract")?;
    handlers.register(store_status::NAME, store_status::StoreStatusStream)?;

    contracts
        .register(daily_calculate::contract()?)
        .context("registering daily calculate contract")?;
    handlers.register(daily_calculate::NAME, daily_calculate::DailyCalculate)?;

    Ok(())
}
