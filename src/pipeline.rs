use crate::{
    channel_controller::ChannelController,
    clock::{Clock, SystemClock},
    diagnostics::{DiagnosticLogger, MessageId, Severity},
    notification::{DiscardReason, NotificationListener, NotificationManager},
    plugin::{sort_by_priority, CoreContext, Extension, Plugin, ProcessContext, TelemetryPlugin},
    telemetry::TelemetryItem,
    Config, Error,
};
use serde_json::json;
use std::{fmt, sync::Arc, time::SystemTime};

const DEFAULT_BASE_TYPE: &str = "EventData";

/// Entry point of the telemetry pipeline.
///
/// Owns the processor chain, the channel controller and the shared services plugins get at
/// initialization. Create it, [`initialize`](Self::initialize) it once with the extensions to
/// use, then [`track`](Self::track) telemetry.
///
/// The pipeline never spawns tasks. Hosts drive batching by calling
/// [`poll_timers`](Self::poll_timers) at [`next_deadline`](Self::next_deadline), and call
/// [`on_page_unload`](Self::on_page_unload) before they go away.
///
/// ```no_run
/// # async fn run(client: std::sync::Arc<dyn opentelemetry_http::HttpClient>) -> Result<(), appinsights_channel::Error> {
/// use appinsights_channel::{
///     AppInsightsCore, Config, Extension, Sender, SenderEnvironment, TelemetryItem,
/// };
///
/// let mut core = AppInsightsCore::new();
/// let sender = Sender::new(SenderEnvironment::new().with_client(client));
/// core.initialize(
///     Config::with_instrumentation_key("0fdcec70-0ce5-4085-89d9-9ae8ead9af66"),
///     vec![Extension::Channel(Box::new(sender))],
/// )?;
///
/// core.track(TelemetryItem::new("app started")).await?;
/// core.flush().await;
/// # Ok(())
/// # }
/// ```
pub struct AppInsightsCore {
    logger: Arc<DiagnosticLogger>,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationManager>,
    instrumentation_key: Option<String>,
    services: Vec<Box<dyn Plugin>>,
    processors: Vec<Box<dyn TelemetryPlugin>>,
    controller: ChannelController,
}

impl fmt::Debug for AppInsightsCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInsightsCore")
            .field("initialized", &self.is_initialized())
            .field("services", &self.services.len())
            .field("processors", &self.processors.len())
            .field("channel_queues", &self.controller.len())
            .finish()
    }
}

impl Default for AppInsightsCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppInsightsCore {
    /// Create a pipeline using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a pipeline with a custom time source. Item timestamps and channel timers use it.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        AppInsightsCore {
            logger: Arc::new(DiagnosticLogger::new()),
            clock,
            notifications: Arc::new(NotificationManager::default()),
            instrumentation_key: None,
            services: Vec::new(),
            processors: Vec::new(),
            controller: ChannelController::default(),
        }
    }

    /// Whether [`initialize`](Self::initialize) completed.
    pub fn is_initialized(&self) -> bool {
        self.instrumentation_key.is_some()
    }

    /// Set up the pipeline with `extensions` plus the ones in [`Config::extensions`].
    ///
    /// Services are initialized first, then processors in priority order, then every channel.
    /// Fails if called twice, if no instrumentation key is configured, if an extension has no
    /// identifier, if no channel is registered or if an extension fails to initialize.
    pub fn initialize(
        &mut self,
        mut config: Config,
        extensions: Vec<Extension>,
    ) -> Result<(), Error> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        let instrumentation_key = config.resolve_instrumentation_key()?;

        let mut all = extensions;
        all.append(&mut config.extensions);
        if let Some(extension) = all
            .iter()
            .find(|e| e.identifiers().iter().any(|id| id.trim().is_empty()))
        {
            return Err(Error::InvalidExtension(format!(
                "extension has no identifier: {:?}",
                extension
            )));
        }

        let mut services = Vec::new();
        let mut processors = Vec::new();
        let mut channels = Vec::new();
        let mut queues = Vec::new();
        for extension in all {
            match extension {
                Extension::Service(plugin) => services.push(plugin),
                Extension::Processor(plugin) => processors.push(plugin),
                Extension::Channel(plugin) => channels.push(plugin),
                Extension::ChannelQueue(queue) => queues.push(queue),
            }
        }

        sort_by_priority(&mut processors);
        for pair in processors.windows(2) {
            if pair[0].priority() == pair[1].priority() {
                self.logger.log(
                    Severity::Warning,
                    MessageId::DuplicatePriority,
                    format!("Two extensions have the same priority #{}", pair[0].priority()),
                    Some(json!({
                        "extensions": [pair[0].identifier(), pair[1].identifier()],
                    })),
                );
            }
        }

        let mut controller = ChannelController::new(queues, channels);
        if controller.len() == 0 {
            return Err(Error::NoChannels);
        }

        let ctx = self.context();
        for service in &mut services {
            service.initialize(&config, &ctx)?;
        }
        for processor in &mut processors {
            processor.initialize(&config, &ctx)?;
        }
        controller.initialize(&config, &ctx)?;

        #[cfg(feature = "internal-logs")]
        tracing::debug!(
            target: "appinsights_channel",
            services = services.len(),
            processors = processors.len(),
            channel_queues = controller.len(),
            "Pipeline initialized"
        );

        self.services = services;
        self.processors = processors;
        self.controller = controller;
        self.instrumentation_key = Some(instrumentation_key);
        Ok(())
    }

    /// Validate an item, apply defaults and hand it to the first stage of the chain.
    ///
    /// Items with base data but no base type, or without a name or instrumentation key, are
    /// rejected and reported to the notification listeners as discarded. Delivery problems
    /// never surface here.
    pub async fn track(&mut self, mut item: TelemetryItem) -> Result<(), Error> {
        let default_key = self
            .instrumentation_key
            .as_deref()
            .ok_or(Error::NotInitialized)?;

        if item.base_data.is_some() && item.base_type.is_none() {
            return Err(self.discard(item, "base data without base type"));
        }
        if item.instrumentation_key.as_deref().map_or(true, str::is_empty) {
            item.instrumentation_key = Some(default_key.to_string());
        }
        if item.time.is_none() {
            item.time = Some(self.clock.now());
        }
        if item.base_type.is_none() {
            item.base_type = Some(DEFAULT_BASE_TYPE.to_string());
        }
        if item.name.is_empty() {
            return Err(self.discard(item, "missing name"));
        }

        ProcessContext::new(&mut self.processors, Some(&mut self.controller))
            .process_next(item)
            .await;
        Ok(())
    }

    fn discard(&self, item: TelemetryItem, reason: &'static str) -> Error {
        #[cfg(feature = "internal-logs")]
        tracing::warn!(target: "appinsights_channel", name = %item.name, reason, "Telemetry item discarded");
        self.notifications
            .events_discarded(&[item], DiscardReason::InvalidEvent);
        Error::InvalidTelemetry(reason)
    }

    /// Send everything buffered in every channel.
    pub async fn flush(&mut self) {
        self.controller.flush().await;
    }

    /// Final flush before the host goes away. Channels use the beacon transport when they can.
    pub async fn on_page_unload(&mut self) {
        self.controller.unload_flush().await;
    }

    /// Fire every channel timer that is due.
    pub async fn poll_timers(&mut self) {
        self.controller.poll_timers().await;
    }

    /// Earliest time a channel timer is due, if any is armed.
    pub fn next_deadline(&self) -> Option<SystemTime> {
        self.controller.next_deadline()
    }

    /// Tear down every extension. Telemetry tracked afterwards is dropped by the channels.
    pub fn teardown(&mut self) {
        for processor in &mut self.processors {
            processor.teardown();
        }
        self.controller.teardown();
        for service in &mut self.services {
            service.teardown();
        }
    }

    /// Register a listener for pipeline events.
    pub fn add_notification_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.notifications.add_listener(listener);
    }

    /// Unregister a listener.
    pub fn remove_notification_listener(&self, listener: &Arc<dyn NotificationListener>) {
        self.notifications.remove_listener(listener);
    }

    /// Internal diagnostics shared with every plugin.
    pub fn logger(&self) -> &Arc<DiagnosticLogger> {
        &self.logger
    }

    /// Channel queues, in the order items are handed to them.
    pub fn channel_queues(&self) -> &[Vec<Box<dyn TelemetryPlugin>>] {
        self.controller.queues()
    }

    /// Channel queues, e.g. to pause or resume individual channels.
    pub fn channel_queues_mut(&mut self) -> &mut [Vec<Box<dyn TelemetryPlugin>>] {
        self.controller.queues_mut()
    }

    fn context(&self) -> CoreContext {
        CoreContext {
            logger: self.logger.clone(),
            clock: self.clock.clone(),
            notifications: self.notifications.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Bag;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug)]
    struct Recorder {
        id: &'static str,
        priority: u32,
        log: Log,
        forward: bool,
    }

    impl Recorder {
        fn new(id: &'static str, priority: u32, log: &Log) -> Box<Self> {
            Box::new(Recorder {
                id,
                priority,
                log: log.clone(),
                forward: true,
            })
        }

        fn dropping(id: &'static str, priority: u32, log: &Log) -> Box<Self> {
            let mut recorder = Self::new(id, priority, log);
            recorder.forward = false;
            recorder
        }
    }

    impl Plugin for Recorder {
        fn identifier(&self) -> &str {
            self.id
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn initialize(&mut self, _config: &Config, _ctx: &CoreContext) -> Result<(), Error> {
            self.log.lock().unwrap().push(format!("init {}", self.id));
            Ok(())
        }

        fn teardown(&mut self) {
            self.log.lock().unwrap().push(format!("teardown {}", self.id));
        }
    }

    #[async_trait]
    impl TelemetryPlugin for Recorder {
        async fn process_telemetry(&mut self, item: TelemetryItem, ctx: &mut ProcessContext<'_>) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {}", self.id, item.name));
            if self.forward {
                ctx.process_next(item).await;
            }
        }

        async fn flush(&mut self) {
            self.log.lock().unwrap().push(format!("flush {}", self.id));
        }
    }

    #[derive(Debug, Default)]
    struct Discarded(Mutex<Vec<String>>);

    impl NotificationListener for Discarded {
        fn events_discarded(&self, items: &[TelemetryItem], reason: DiscardReason) {
            assert_eq!(DiscardReason::InvalidEvent, reason);
            self.0
                .lock()
                .unwrap()
                .extend(items.iter().map(|i| i.name.clone()));
        }
    }

    fn config() -> Config {
        Config::with_instrumentation_key("0fdcec70-0ce5-4085-89d9-9ae8ead9af66")
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn initialize_once() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        core.initialize(config(), vec![Extension::Channel(Recorder::new("c", 1, &log))])
            .unwrap();
        assert!(core.is_initialized());
        let err = core
            .initialize(config(), vec![Extension::Channel(Recorder::new("c", 1, &log))])
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized));
    }

    #[test]
    fn requires_instrumentation_key() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        let err = core
            .initialize(
                Config::default(),
                vec![Extension::Channel(Recorder::new("c", 1, &log))],
            )
            .unwrap_err();
        assert!(matches!(err, Error::MissingInstrumentationKey));
        assert!(!core.is_initialized());
    }

    #[test]
    fn requires_channels() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        let err = core
            .initialize(config(), vec![Extension::Processor(Recorder::new("p", 1, &log))])
            .unwrap_err();
        assert!(matches!(err, Error::NoChannels));
    }

    #[test]
    fn rejects_extension_without_identifier() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        let err = core
            .initialize(
                config(),
                vec![
                    Extension::Channel(Recorder::new("c", 1, &log)),
                    Extension::Processor(Recorder::new(" ", 10, &log)),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidExtension(_)));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn initializes_services_then_processors_then_channels() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        let mut config = config();
        config.extensions = vec![Extension::Processor(Recorder::new("p1", 10, &log))];
        core.initialize(
            config,
            vec![
                Extension::Channel(Recorder::new("c", 1001, &log)),
                Extension::Processor(Recorder::new("p2", 5, &log)),
                Extension::Service(Recorder::new("s", 100, &log)),
            ],
        )
        .unwrap();
        assert_eq!(vec!["init s", "init p2", "init p1", "init c"], entries(&log));
    }

    #[test]
    fn duplicate_priorities_are_reported() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        core.initialize(
            config(),
            vec![
                Extension::Processor(Recorder::new("a", 10, &log)),
                Extension::Processor(Recorder::new("b", 10, &log)),
                Extension::Channel(Recorder::new("c", 1001, &log)),
            ],
        )
        .unwrap();
        assert_eq!(1, core.logger().count(MessageId::DuplicatePriority));
    }

    #[tokio::test]
    async fn track_requires_initialization() {
        let mut core = AppInsightsCore::new();
        let err = core.track(TelemetryItem::new("item")).await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[tokio::test]
    async fn items_flow_through_processors_to_every_queue() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        core.initialize(
            config(),
            vec![
                Extension::Processor(Recorder::new("p2", 20, &log)),
                Extension::Processor(Recorder::new("p1", 10, &log)),
                Extension::Channel(Recorder::new("c1", 1001, &log)),
                Extension::ChannelQueue(vec![
                    Recorder::new("q2", 1002, &log) as Box<dyn TelemetryPlugin>,
                    Recorder::new("q1", 1001, &log),
                ]),
            ],
        )
        .unwrap();
        assert_eq!(2, core.channel_queues().len());
        log.lock().unwrap().clear();

        core.track(TelemetryItem::new("item")).await.unwrap();
        assert_eq!(
            vec!["p1 item", "p2 item", "q1 item", "q2 item", "c1 item"],
            entries(&log)
        );
    }

    #[tokio::test]
    async fn processor_can_drop_items() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        core.initialize(
            config(),
            vec![
                Extension::Processor(Recorder::dropping("filter", 10, &log)),
                Extension::Channel(Recorder::new("c", 1001, &log)),
            ],
        )
        .unwrap();
        log.lock().unwrap().clear();

        core.track(TelemetryItem::new("item")).await.unwrap();
        assert_eq!(vec!["filter item"], entries(&log));
    }

    #[tokio::test]
    async fn invalid_items_are_discarded() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        let discarded = Arc::new(Discarded::default());
        core.add_notification_listener(discarded.clone());
        core.initialize(config(), vec![Extension::Channel(Recorder::new("c", 1001, &log))])
            .unwrap();
        log.lock().unwrap().clear();

        let mut item = TelemetryItem::new("no base type");
        item.base_data = Some(Bag::new());
        assert!(matches!(
            core.track(item).await,
            Err(Error::InvalidTelemetry(_))
        ));
        assert!(matches!(
            core.track(TelemetryItem::new("")).await,
            Err(Error::InvalidTelemetry(_))
        ));
        assert_eq!(vec!["no base type", ""], *discarded.0.lock().unwrap());
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn defaults_are_applied() {
        #[derive(Debug)]
        struct Capture(Arc<Mutex<Option<TelemetryItem>>>);

        impl Plugin for Capture {
            fn identifier(&self) -> &str {
                "capture"
            }
            fn priority(&self) -> u32 {
                1001
            }
            fn initialize(&mut self, _config: &Config, _ctx: &CoreContext) -> Result<(), Error> {
                Ok(())
            }
        }

        #[async_trait]
        impl TelemetryPlugin for Capture {
            async fn process_telemetry(&mut self, item: TelemetryItem, _ctx: &mut ProcessContext<'_>) {
                *self.0.lock().unwrap() = Some(item);
            }
        }

        let captured = Arc::new(Mutex::new(None));
        let mut core = AppInsightsCore::new();
        core.initialize(config(), vec![Extension::Channel(Box::new(Capture(captured.clone())))])
            .unwrap();
        core.track(TelemetryItem::new("item")).await.unwrap();

        let item = captured.lock().unwrap().take().unwrap();
        assert_eq!(Some("EventData"), item.base_type.as_deref());
        assert_eq!(
            Some("0fdcec70-0ce5-4085-89d9-9ae8ead9af66"),
            item.instrumentation_key.as_deref()
        );
        assert!(item.time.is_some());
    }

    #[tokio::test]
    async fn flush_and_teardown_reach_every_extension() {
        let log = Log::default();
        let mut core = AppInsightsCore::new();
        core.initialize(
            config(),
            vec![
                Extension::Service(Recorder::new("s", 1, &log)),
                Extension::Processor(Recorder::new("p", 10, &log)),
                Extension::Channel(Recorder::new("c", 1001, &log)),
            ],
        )
        .unwrap();
        log.lock().unwrap().clear();

        core.flush().await;
        core.teardown();
        assert_eq!(vec!["flush c", "teardown p", "teardown c", "teardown s"], entries(&log));
    }
}
