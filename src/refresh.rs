//! Timer-driven refresh page
//!
//! [`RefreshController`] is a small UI component. Once started, a timer ticks
//! at a fixed interval, and every tick fires off a refresh nobody awaits: fetch
//! new data, then show it. The component lives inside a [`Dispatcher`], and
//! every change to its state happens there.
//!
//! Refreshes are attached to a failure continuation which records the error
//! for display, so a failed fetch shows up on the page and the timer carries
//! on. The page can also be configured not to guard its refreshes, in which
//! case the first failure escapes to the dispatcher and ends the session.
//!
//! Disposal releases the timer and invalidates the continuations of refreshes
//! which are still in flight, so nothing touches the page after it is gone.

use crate::client::IAsyncOpClient;
use crate::config::DemoConfig;
use crate::detached::callback::{attach, AsyncOpClient, Continuations};
use crate::detached::polling::{snapshot_channel, SnapshotPublisher, SnapshotReader};
use crate::error::RefreshError;
use crate::executor::dispatch::{DispatchCallbackExecutor, DispatchHandle, Dispatcher};
use crate::services::feed::DataFetch;
use crate::status::AsyncOpError;
use crate::timer::TimerSubscription;
use chrono::{DateTime, Local};
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};


/// Lifecycle of the refresh page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// Not started yet, the start control is enabled
    Idle,

    /// Timer running, no refresh in flight
    Armed,

    /// Timer running, at least one refresh in flight
    Refreshing,

    /// Disposed, nothing will happen anymore
    Disposed,
}


/// Most recent failure captured by the page
#[derive(Clone, Debug, PartialEq)]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Local>,
}
//
impl Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.at.format("%H:%M:%S"))
    }
}


/// What the renderer gets to see of the page
#[derive(Clone, Debug, PartialEq)]
pub struct DisplaySnapshot {
    pub state: ControllerState,
    pub message: String,
    pub last_error: Option<String>,

    /// Render request this snapshot was published for
    pub render: u64,
}
//
impl Default for DisplaySnapshot {
    fn default() -> Self {
        DisplaySnapshot {
            state: ControllerState::Idle,
            message: String::new(),
            last_error: None,
            render: 0,
        }
    }
}
//
impl DisplaySnapshot {
    /// Whether the start control is enabled
    pub fn can_start(&self) -> bool {
        self.state == ControllerState::Idle
    }
}


/// Settings of a refresh page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefreshSettings {
    /// Timer period
    pub interval: Duration,

    /// Attach refreshes to a failure continuation
    pub guarded: bool,
}
//
impl Default for RefreshSettings {
    fn default() -> Self {
        RefreshSettings { interval: Duration::from_millis(2000), guarded: true }
    }
}
//
impl From<&DemoConfig> for RefreshSettings {
    fn from(config: &DemoConfig) -> Self {
        RefreshSettings {
            interval: config.refresh_interval(),
            guarded: config.guarded,
        }
    }
}


/// Timer-driven refresh page
pub struct RefreshController<F: DataFetch> {
    /// Where fresh data comes from
    fetcher: Arc<F>,

    /// Handle to the dispatcher this page lives on
    ui: DispatchHandle<Self>,

    settings: RefreshSettings,

    /// Idle, Armed or Disposed, Refreshing is derived from `in_flight`
    state: ControllerState,

    /// Latest data shown
    message: String,

    last_error: Option<LastError>,

    /// Also counts render requests
    publisher: SnapshotPublisher<DisplaySnapshot>,

    /// Present while armed
    timer: Option<TimerSubscription>,

    in_flight: InFlight,
}
//
impl<F: DataFetch> RefreshController<F> {
    /// Create an idle page
    pub fn new(
        fetcher: Arc<F>,
        ui: DispatchHandle<Self>,
        settings: RefreshSettings,
        publisher: SnapshotPublisher<DisplaySnapshot>
    ) -> Self {
        RefreshController {
            fetcher,
            ui,
            settings,
            state: ControllerState::Idle,
            message: String::new(),
            last_error: None,
            publisher,
            timer: None,
            in_flight: InFlight::default(),
        }
    }

    /// Create an idle page on its own dispatcher, along with a reader for the
    /// snapshots it publishes
    pub fn mount(
        fetcher: Arc<F>,
        settings: RefreshSettings
    ) -> (Dispatcher<Self>, SnapshotReader<DisplaySnapshot>) {
        let (publisher, reader) = snapshot_channel(DisplaySnapshot::default());
        let dispatcher = Dispatcher::new(|ui| {
            RefreshController::new(fetcher, ui, settings, publisher)
        });
        (dispatcher, reader)
    }

    /// Arm the refresh timer
    ///
    /// Does nothing if the page is already armed or was disposed. Must run
    /// within a tokio runtime, otherwise the page stays idle.
    pub fn start(&mut self) {
        match self.state {
            ControllerState::Idle => {}
            ControllerState::Armed | ControllerState::Refreshing => {
                debug!("refresh timer already armed");
                return;
            }
            ControllerState::Disposed => {
                warn!("cannot start a disposed refresh page");
                return;
            }
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!("cannot arm the refresh timer outside of a tokio runtime");
                return;
            }
        };

        let fetcher = self.fetcher.clone();
        let ui = self.ui.clone();
        let guarded = self.settings.guarded;
        let in_flight = self.in_flight.clone();
        let timer = TimerSubscription::every(
            &runtime,
            self.settings.interval,
            move || on_tick(&fetcher, &ui, guarded, &in_flight)
        );
        info!(interval = ?timer.period(), guarded, "refresh timer armed");
        self.timer = Some(timer);
        self.state = ControllerState::Armed;
        self.request_render();
    }

    /// Release the timer and invalidate in-flight refreshes
    ///
    /// Safe to call at any time, any number of times.
    pub fn dispose(&mut self) {
        if self.state == ControllerState::Disposed {
            return;
        }
        self.timer = None;
        let invalidated = self.in_flight.close();
        self.state = ControllerState::Disposed;
        debug!(invalidated, "refresh page disposed");
        self.request_render();
    }

    /// Show freshly fetched data
    pub fn show(&mut self, data: String) {
        if self.state == ControllerState::Disposed {
            return;
        }
        self.message = data;
        self.request_render();
    }

    /// Record a failure for display
    ///
    /// The error stays displayed until the next failure replaces it.
    pub fn record_error(&mut self, err: &dyn Display) {
        if self.state == ControllerState::Disposed {
            return;
        }
        let last = LastError { message: err.to_string(), at: Local::now() };
        warn!(error = %last, "refresh failed");
        self.last_error = Some(last);
        self.request_render();
    }

    /// Ask the renderer to redraw the page
    pub fn request_render(&mut self) {
        let mut snapshot = self.snapshot();
        snapshot.render += 1;
        self.publisher.publish(snapshot);
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        match self.state {
            ControllerState::Armed if self.in_flight.pending() > 0 => {
                ControllerState::Refreshing
            }
            state => state,
        }
    }

    /// Whether the start control is enabled
    pub fn can_start(&self) -> bool {
        self.state == ControllerState::Idle
    }

    /// Latest data shown
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Most recent failure, if any
    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    /// Number of render requests so far
    pub fn render_requests(&self) -> u64 {
        self.publisher.published()
    }

    /// Snapshot of what should be on screen
    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            state: self.state(),
            message: self.message.clone(),
            last_error: self.last_error.as_ref().map(ToString::to_string),
            render: self.publisher.published(),
        }
    }
}
//
impl<F: DataFetch> Drop for RefreshController<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}


/// Tick handler, runs on the timer's task
fn on_tick<F: DataFetch>(
    fetcher: &Arc<F>,
    ui: &DispatchHandle<RefreshController<F>>,
    guarded: bool,
    in_flight: &InFlight
) {
    let operation = refresh(fetcher.clone(), ui.clone());
    if guarded {
        let client = attach(
            &DispatchCallbackExecutor::new(ui.clone()),
            operation,
            Continuations::new().on_failure(
                |page: &mut RefreshController<F>, err: AsyncOpError<RefreshError>| {
                    page.record_error(&err)
                }
            )
        );
        in_flight.track(client);
    } else {
        ui.spawn_unobserved(operation);
    }
}


/// One refresh: fetch, then show the result on the page
async fn refresh<F: DataFetch>(
    fetcher: Arc<F>,
    ui: DispatchHandle<RefreshController<F>>
) -> Result<(), RefreshError> {
    // Let the tick handler return before doing any work
    tokio::task::yield_now().await;

    let data = fetcher.fetch().await?;
    ui.invoke(move |page| page.show(data)).await?;
    Ok(())
}


/// Refreshes which may still call back into the page
#[derive(Clone, Default)]
struct InFlight {
    inner: Arc<Mutex<InFlightInner>>,
}
//
#[derive(Default)]
struct InFlightInner {
    clients: Vec<AsyncOpClient<RefreshError>>,

    /// Set on disposal, late arrivals are invalidated right away
    closed: bool,
}
//
impl InFlight {
    fn lock(&self) -> std::sync::MutexGuard<'_, InFlightInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, mut client: AsyncOpClient<RefreshError>) {
        let mut inner = self.lock();
        if inner.closed {
            client.cancel();
            return;
        }
        inner.clients.retain(|c| !c.is_settled());
        inner.clients.push(client);
    }

    fn pending(&self) -> usize {
        self.lock().clients.iter().filter(|c| !c.is_settled()).count()
    }

    /// Invalidate every unsettled refresh, returns how many there were
    fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let mut invalidated = 0;
        for client in inner.clients.iter_mut().filter(|c| !c.is_settled()) {
            client.cancel();
            invalidated += 1;
        }
        inner.clients.clear();
        invalidated
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, SessionError};
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Feed answering from a script, then with a steady value
    struct ScriptedFeed {
        script: Mutex<VecDeque<Result<String, FetchError>>>,
        delay: Duration,
        calls: AtomicUsize,
    }
    //
    impl ScriptedFeed {
        fn new(script: Vec<Result<String, FetchError>>, delay: Duration) -> Arc<Self> {
            Arc::new(ScriptedFeed {
                script: Mutex::new(script.into()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }
    //
    impl DataFetch for ScriptedFeed {
        async fn fetch(&self) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok("steady".to_owned()))
        }
    }

    fn network_down() -> Result<String, FetchError> {
        Err(FetchError::Network("network down".to_owned()))
    }

    fn settings(guarded: bool) -> RefreshSettings {
        RefreshSettings { interval: Duration::from_millis(2000), guarded }
    }

    /// Start a page on a spawned dispatcher
    fn mount_running(
        feed: Arc<ScriptedFeed>,
        guarded: bool
    ) -> (DispatchHandle<RefreshController<ScriptedFeed>>,
          SnapshotReader<DisplaySnapshot>,
          tokio::task::JoinHandle<
              Result<RefreshController<ScriptedFeed>, SessionError>>) {
        let (dispatcher, reader) = RefreshController::mount(feed, settings(guarded));
        let ui = dispatcher.handle();
        let session = tokio::spawn(dispatcher.run());
        (ui, reader, session)
    }

    /// Check how the last error is rendered
    #[test]
    fn last_error_format() {
        let at = Local.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap();
        let err = LastError { message: "network down".to_owned(), at };
        assert_eq!(err.to_string(), "network down at 09:03:07");
    }

    /// Check recording an error without any timer involved
    #[test]
    fn record_error_requests_render() {
        let feed = ScriptedFeed::new(Vec::new(), Duration::ZERO);
        let (mut dispatcher, mut reader) =
            RefreshController::mount(feed, settings(true));
        dispatcher.handle().post(|page| page.record_error(&"network down")).unwrap();
        assert_eq!(dispatcher.drain(), Ok(1));

        let page = dispatcher.state();
        assert!(page.last_error().unwrap().to_string().starts_with("network down at "));
        assert_eq!(page.render_requests(), 1);
        let snapshot = reader.latest();
        assert_eq!(snapshot.render, 1);
        assert!(snapshot.last_error.as_ref().unwrap().starts_with("network down at "));
    }

    /// A failed tick is displayed, and the timer keeps going
    #[tokio::test(start_paused = true)]
    async fn failed_tick_is_recorded_and_ticking_continues() {
        let feed = ScriptedFeed::new(
            vec![network_down(), Ok("fresh".to_owned())],
            Duration::ZERO
        );
        let (ui, mut reader, session) = mount_running(feed.clone(), true);
        ui.invoke(|page| page.start()).await.unwrap();

        sleep(Duration::from_millis(2100)).await;
        assert_eq!(feed.calls(), 1);
        let (last_error, renders) = ui
            .invoke(|page| (page.last_error().cloned(), page.render_requests()))
            .await
            .unwrap();
        let last_error = last_error.expect("failure should be recorded");
        assert_eq!(last_error.message, "network down");
        assert!(last_error.to_string().starts_with("network down at "));
        assert_eq!(renders, 2);

        sleep(Duration::from_millis(2000)).await;
        assert_eq!(feed.calls(), 2);
        let (message, still_failed) = ui
            .invoke(|page| (page.message().to_owned(), page.last_error().is_some()))
            .await
            .unwrap();
        assert_eq!(message, "fresh");
        assert!(still_failed);
        assert_eq!(reader.latest().message, "fresh");

        sleep(Duration::from_millis(2000)).await;
        assert_eq!(feed.calls(), 3);

        ui.invoke(|page| page.dispose()).await.unwrap();
        ui.shutdown();
        assert!(session.await.unwrap().is_ok());
    }

    /// Starting twice arms a single timer
    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let feed = ScriptedFeed::new(Vec::new(), Duration::ZERO);
        let (ui, mut reader, session) = mount_running(feed.clone(), true);

        assert!(ui.invoke(|page| page.can_start()).await.unwrap());
        ui.invoke(|page| page.start()).await.unwrap();
        ui.invoke(|page| page.start()).await.unwrap();
        assert!(!ui.invoke(|page| page.can_start()).await.unwrap());
        assert!(!reader.latest().can_start());

        sleep(Duration::from_millis(2100)).await;
        assert_eq!(feed.calls(), 1);
        assert_eq!(ui.invoke(|page| page.state()).await.unwrap(),
                   ControllerState::Armed);

        ui.shutdown();
        session.await.unwrap().unwrap();
    }

    /// Disposal stops the ticks, and is safe whenever it happens
    #[tokio::test(start_paused = true)]
    async fn dispose_stops_ticks() {
        let feed = ScriptedFeed::new(Vec::new(), Duration::ZERO);
        let (ui, _reader, session) = mount_running(feed.clone(), true);

        ui.invoke(|page| page.start()).await.unwrap();
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(feed.calls(), 1);

        ui.invoke(|page| {
            page.dispose();
            page.dispose();
        }).await.unwrap();
        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(feed.calls(), 1);

        // Nothing can bring it back
        ui.invoke(|page| page.start()).await.unwrap();
        assert_eq!(ui.invoke(|page| page.state()).await.unwrap(),
                   ControllerState::Disposed);

        ui.shutdown();
        session.await.unwrap().unwrap();
    }

    /// Disposing a page that never started is fine
    #[test]
    fn dispose_without_start() {
        let feed = ScriptedFeed::new(Vec::new(), Duration::ZERO);
        let (mut dispatcher, _reader) = RefreshController::mount(feed, settings(true));
        dispatcher.handle().post(|page| page.dispose()).unwrap();
        assert_eq!(dispatcher.drain(), Ok(1));
        assert_eq!(dispatcher.state().state(), ControllerState::Disposed);
    }

    /// Refreshes in flight at disposal never reach the page
    #[tokio::test(start_paused = true)]
    async fn dispose_invalidates_in_flight_refreshes() {
        let feed = ScriptedFeed::new(vec![network_down()], Duration::from_millis(1000));
        let (ui, _reader, session) = mount_running(feed.clone(), true);

        ui.invoke(|page| page.start()).await.unwrap();
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(feed.calls(), 1);
        assert_eq!(ui.invoke(|page| page.state()).await.unwrap(),
                   ControllerState::Refreshing);

        ui.invoke(|page| page.dispose()).await.unwrap();
        sleep(Duration::from_millis(1000)).await;
        assert!(ui.invoke(|page| page.last_error().is_none()).await.unwrap());

        ui.shutdown();
        session.await.unwrap().unwrap();
    }

    /// Without a failure continuation, the first failure ends the session
    #[tokio::test(start_paused = true)]
    async fn unguarded_failure_ends_session() {
        let feed = ScriptedFeed::new(vec![network_down()], Duration::ZERO);
        let (ui, _reader, session) = mount_running(feed.clone(), false);

        ui.invoke(|page| page.start()).await.unwrap();
        let outcome = session.await.unwrap();
        assert_eq!(
            outcome.err(),
            Some(SessionError::UnhandledFailure("network down".to_owned()))
        );
        assert!(ui.is_closed());
    }
}
