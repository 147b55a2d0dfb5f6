//! Extension points of the pipeline.
//!
//! Telemetry flows through a chain of [`TelemetryPlugin`]s. Each plugin decides whether to pass an
//! item on by calling [`ProcessContext::process_next`]; the chain of processors ends at the
//! channel controller, which hands every item to each channel queue.

use crate::{
    channel_controller::ChannelController, clock::Clock, diagnostics::DiagnosticLogger,
    notification::NotificationManager, telemetry::TelemetryItem, Config, Error,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::SystemTime};

/// Shared services handed to every plugin at initialization.
#[derive(Debug, Clone)]
pub struct CoreContext {
    /// Internal diagnostics.
    pub logger: Arc<DiagnosticLogger>,
    /// Time source for scheduling.
    pub clock: Arc<dyn Clock>,
    /// Pipeline event fan-out.
    pub notifications: Arc<NotificationManager>,
}

/// Common part of every extension.
pub trait Plugin: Debug + Send {
    /// Unique, non-empty name of the extension. Also the key of its `extensionConfig` section.
    fn identifier(&self) -> &str;

    /// Position in the chain; lower runs first.
    fn priority(&self) -> u32;

    /// Prepare the plugin for use. Called once before any telemetry is processed.
    fn initialize(&mut self, config: &Config, ctx: &CoreContext) -> Result<(), Error>;

    /// Release resources. No telemetry is processed afterwards.
    fn teardown(&mut self) {}
}

/// An extension that takes part in processing telemetry.
#[async_trait]
pub trait TelemetryPlugin: Plugin {
    /// Process an item. Call [`ProcessContext::process_next`] to pass it on; not calling it drops
    /// the item for the rest of the chain.
    async fn process_telemetry(&mut self, item: TelemetryItem, ctx: &mut ProcessContext<'_>);

    /// Send everything buffered.
    async fn flush(&mut self) {}

    /// Final flush before the host goes away.
    async fn unload_flush(&mut self) {
        self.flush().await
    }

    /// Run scheduled work that is due.
    async fn poll_timer(&mut self) {}

    /// When [`poll_timer`](Self::poll_timer) next has work to do.
    fn next_deadline(&self) -> Option<SystemTime> {
        None
    }

    /// Stop scheduled sends. Telemetry is still buffered.
    fn pause(&mut self) {}

    /// Resume scheduled sends.
    fn resume(&mut self) {}
}

/// The remainder of the chain an item is processed in.
#[derive(Debug)]
pub struct ProcessContext<'a> {
    next: &'a mut [Box<dyn TelemetryPlugin>],
    terminal: Option<&'a mut ChannelController>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        next: &'a mut [Box<dyn TelemetryPlugin>],
        terminal: Option<&'a mut ChannelController>,
    ) -> Self {
        ProcessContext { next, terminal }
    }

    /// Pass the item to the next stage of the chain.
    pub async fn process_next(&mut self, item: TelemetryItem) {
        match self.next.split_first_mut() {
            Some((head, rest)) => {
                let mut ctx = ProcessContext {
                    next: rest,
                    terminal: self.terminal.as_deref_mut(),
                };
                head.process_telemetry(item, &mut ctx).await;
            }
            None => {
                if let Some(terminal) = self.terminal.as_deref_mut() {
                    terminal.process_telemetry(item).await;
                }
            }
        }
    }

    /// Whether there is a stage after the current one.
    pub fn has_next(&self) -> bool {
        !self.next.is_empty() || self.terminal.is_some()
    }
}

/// An extension registered with the pipeline.
#[derive(Debug)]
pub enum Extension {
    /// Initialized with the pipeline but never sees telemetry.
    Service(Box<dyn Plugin>),
    /// Part of the processor chain, ordered by priority.
    Processor(Box<dyn TelemetryPlugin>),
    /// A channel. All channels registered this way form one queue.
    Channel(Box<dyn TelemetryPlugin>),
    /// An explicit channel queue, ordered by priority. Items enter at its first member.
    ChannelQueue(Vec<Box<dyn TelemetryPlugin>>),
}

impl Extension {
    pub(crate) fn identifiers(&self) -> Vec<&str> {
        match self {
            Extension::Service(p) => vec![p.identifier()],
            Extension::Processor(p) | Extension::Channel(p) => vec![p.identifier()],
            Extension::ChannelQueue(queue) => queue.iter().map(|p| p.identifier()).collect(),
        }
    }
}

/// Sort plugins by ascending priority, keeping registration order for equal priorities.
pub(crate) fn sort_by_priority(plugins: &mut [Box<dyn TelemetryPlugin>]) {
    plugins.sort_by_key(|p| p.priority());
}
