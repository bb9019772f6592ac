//! Eagerly loaded country list
//!
//! [`CountryService`] starts loading its data as soon as it is constructed,
//! without anybody awaiting the load. The load is attached to logging
//! continuations, so a failure is reported rather than lost, and data access
//! waits on the load's completion handle. Some loads fail on purpose, to keep
//! the failure path exercised.
//!
//! The service is not owned by any dispatcher: the load fills the list from a
//! runtime worker while readers may be anywhere. The list therefore sits behind
//! a lock, held only for the synchronous refill and copy steps.

use crate::detached::callback::{attach, AsyncOpClient, Continuations};
use crate::error::LoadError;
use crate::executor::inline::InlineCallbackExecutor;
use crate::status::{AsyncOpError, AsyncOpStatus};
use rand::Rng;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{error, info};


/// The country names served once loaded
pub const COUNTRIES: [&str; 4] = ["Australia", "Brazil", "Canada", "Denmark"];

/// Probability that a load ends with an injected fault
pub const LOAD_FAILURE_PROBABILITY: f64 = 0.5;

/// Simulated time taken by a load
const LOAD_LATENCY: Duration = Duration::from_millis(200);


/// Service serving a country list that is loaded in the background
pub struct CountryService {
    /// Backing collection, filled by the background load
    countries: Arc<RwLock<Vec<String>>>,

    /// Loading handle, settles once the background load is over
    loading: AsyncOpClient<LoadError>,
}
//
impl CountryService {
    /// Create the service and start loading right away
    ///
    /// Must be called from within a tokio runtime for the load to happen. If
    /// it is not, the failure is logged and the service stays empty.
    pub fn new() -> Self {
        Self::start(|| rand::thread_rng().gen_bool(LOAD_FAILURE_PROBABILITY))
    }

    fn start<F>(inject_fault: F) -> Self
        where F: FnOnce() -> bool + Send + 'static
    {
        let countries = Arc::new(RwLock::new(Vec::new()));
        let loading = attach(
            &InlineCallbackExecutor::new(),
            populate(countries.clone(), inject_fault),
            Continuations::new()
                .on_success(|_: &mut ()| info!("country list loaded"))
                .on_failure(|_: &mut (), err: AsyncOpError<LoadError>| {
                    error!(severity = "critical", error = %err,
                           "country list failed to load");
                })
        );
        CountryService { countries, loading }
    }

    /// Wait for the background load to settle, then return the countries
    ///
    /// A failed load is not reported here: the list is returned in whatever
    /// state the load left it. Use [`load_status`](Self::load_status) to tell.
    pub async fn get_data(&self) -> Vec<String> {
        self.loading.completion().wait().await;
        self.snapshot()
    }

    /// Status of the background load
    pub fn load_status(&self) -> AsyncOpStatus<LoadError> {
        self.loading.status()
    }

    /// Check whether the background load has settled
    pub fn is_loaded(&self) -> bool {
        self.loading.is_settled()
    }

    fn snapshot(&self) -> Vec<String> {
        self.countries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
//
impl Default for CountryService {
    fn default() -> Self {
        Self::new()
    }
}


/// Background load: clear and refill the list, then maybe fail
async fn populate<F>(
    countries: Arc<RwLock<Vec<String>>>,
    inject_fault: F
) -> Result<(), LoadError>
    where F: FnOnce() -> bool
{
    tokio::task::yield_now().await;
    tokio::time::sleep(LOAD_LATENCY).await;

    let loaded = {
        let mut countries =
            countries.write().unwrap_or_else(PoisonError::into_inner);
        countries.clear();
        countries.extend(COUNTRIES.iter().map(|name| (*name).to_owned()));
        countries.len()
    };

    if inject_fault() {
        return Err(LoadError::InjectedFault { loaded });
    }
    Ok(())
}
