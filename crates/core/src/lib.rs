#![deny(rust_2018_idioms)]

//! Renders chat messages per recipient before they leave the server.
//!
//! The host hands every outbound packet to [`ChatPipeline::intercept`].
//! Chat packets are rendered on a pool of threads and delivered through the
//! connection's [`PacketSink`] in the order the host sent them. Everything
//! else is handed straight back unless it has to wait behind a chat packet.

pub mod cache;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod interceptor;
pub mod pipeline;
pub mod registry;
pub mod rewriter;

use cache::{CacheStats, RecipientViewCache};
use chatr_network::schema::schema_for;
use chatr_network::{ConnectionId, PacketSink, RawPacket};
use config::ChatConfig;
use context::MessageContext;
use dispatcher::{ConnectionInfo, Dispatcher, Ticket};
use error::{InterceptError, PipelineError};
use interceptor::PacketInterceptor;
use pipeline::FormatPipeline;
use registry::PlayerRegistry;
use rewriter::{PacketHandle, PacketRewriter};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

/// What became of an intercepted packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Interception {
    /// Send the packet now, it has nothing to wait for.
    PassThrough(RawPacket),
    /// The pipeline took the packet and will deliver it through the sink.
    Captured,
}

struct Shared {
    interceptor: PacketInterceptor,
    format: FormatPipeline,
    cache: RecipientViewCache,
    rewriter: PacketRewriter,
    dispatcher: Dispatcher,
    in_flight: InFlight,
}

/// Counts render jobs that have not ended yet.
#[derive(Default)]
struct InFlight {
    jobs: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) {
        *self.lock() += 1;
    }

    fn finish(&self) {
        let mut jobs = self.lock();
        *jobs = jobs.saturating_sub(1);
        if *jobs == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let jobs = self.lock();
        let (_jobs, result) = self
            .idle
            .wait_timeout_while(jobs, timeout, |jobs| *jobs != 0)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }
}

/// A spawned render job. Dropping it ends the job, whether it ran or was
/// dropped by a shutting down runtime.
struct Job(Arc<Shared>);

impl Drop for Job {
    fn drop(&mut self) {
        self.0.in_flight.finish();
    }
}

impl Shared {
    fn render_job(&self, context: MessageContext, handle: PacketHandle, recipient: u128, ticket: Ticket) {
        let id = context.id;
        let view = self
            .cache
            .get_or_compute(id, recipient, || self.format.render(&context, recipient));
        match view {
            None => ticket.discard(),
            Some(view) if !view.format_flags.changed() => ticket.dispatch(handle.packet),
            Some(view) => match self.rewriter.rewrite(&handle, &view) {
                Ok(rewritten) => ticket.dispatch(rewritten.packet),
                Err(err) => {
                    warn!(
                        "Sending message {} to connection {} unrendered: {}",
                        id, handle.connection, err
                    );
                    ticket.dispatch(handle.packet);
                }
            },
        }
        self.cache.mark_served(id, recipient);
    }
}

pub struct ChatPipeline {
    shared: Arc<Shared>,
    runtime: Option<Runtime>,
}

impl ChatPipeline {
    pub fn new(
        config: &ChatConfig,
        registry: Arc<dyn PlayerRegistry>,
    ) -> Result<ChatPipeline, PipelineError> {
        config.validate()?;
        let threads = config.render_threads as usize;
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("chatr-render")
            .enable_time()
            .build()?;

        let shared = Arc::new(Shared {
            interceptor: PacketInterceptor::new(registry.clone(), config.color_permission.clone()),
            format: FormatPipeline::from_config(config, registry)?,
            cache: RecipientViewCache::new(config.cache_ttl()),
            rewriter: PacketRewriter::new(config.max_rendered_length as usize),
            dispatcher: Dispatcher::new(),
            in_flight: InFlight::default(),
        });

        let weak = Arc::downgrade(&shared);
        let ttl = config.cache_ttl();
        runtime.spawn(async move {
            let mut interval = tokio::time::interval(ttl / 2);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.cache.evict_expired();
                // Outlives every cache entry a repeat could still collide with
                shared.dispatcher.forget_repeats(ttl * 2);
            }
        });

        info!(
            "Chat pipeline started with {} render threads and transformers {:?}",
            threads,
            shared.format.kinds()
        );
        Ok(ChatPipeline {
            shared,
            runtime: Some(runtime),
        })
    }

    /// Starts tracking a connection. `player` is the uuid of the player the
    /// connection belongs to.
    pub fn open_connection(
        &self,
        connection: ConnectionId,
        player: u128,
        protocol: i32,
        sink: Box<dyn PacketSink>,
    ) {
        if schema_for(protocol).is_none() {
            debug!(
                "Connection {} uses protocol {}, its chat will pass through",
                connection, protocol
            );
        }
        let dispatcher = &self.shared.dispatcher;
        dispatcher.open(connection, ConnectionInfo { player, protocol }, sink);
        self.shared.cache.set_audience(dispatcher.len());
    }

    pub fn close_connection(&self, connection: ConnectionId) {
        let dispatcher = &self.shared.dispatcher;
        if dispatcher.close(connection) {
            self.shared.cache.set_audience(dispatcher.len());
        }
    }

    /// Offers an outbound packet to the pipeline.
    ///
    /// Must be called in send order, from one thread at a time per
    /// connection. A [`Interception::PassThrough`] packet has to be sent
    /// before the next packet of the connection is intercepted.
    pub fn intercept(&self, connection: ConnectionId, packet: RawPacket) -> Interception {
        let shared = &self.shared;
        let Some(info) = shared.dispatcher.info(connection) else {
            return Interception::PassThrough(packet);
        };
        let captured = match shared.interceptor.capture(info.protocol, &packet) {
            Ok(Some(captured)) => captured,
            Ok(None) | Err(InterceptError::UnknownProtocol(_)) => return self.forward(connection, packet),
            Err(err) => {
                debug!("Passing packet through on connection {}: {}", connection, err);
                return self.forward(connection, packet);
            }
        };
        let Some(runtime) = &self.runtime else {
            return self.forward(connection, packet);
        };
        let Some(ticket) = shared.dispatcher.reserve(connection, packet.clone()) else {
            return Interception::PassThrough(packet);
        };

        let handle = PacketHandle {
            connection,
            packet,
            layout: captured.layout,
        };
        let mut context = captured.context;
        context.id = shared.dispatcher.occurrence(connection, context.id);
        shared.in_flight.start();
        let job = Job(shared.clone());
        runtime.spawn_blocking(move || {
            job.0.render_job(context, handle, info.player, ticket);
        });
        Interception::Captured
    }

    fn forward(&self, connection: ConnectionId, packet: RawPacket) -> Interception {
        match self.shared.dispatcher.forward(connection, packet) {
            Some(packet) => Interception::PassThrough(packet),
            None => Interception::Captured,
        }
    }

    /// Blocks until no render job is running or `timeout` passed. Returns
    /// whether the pipeline went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.in_flight.wait_idle(timeout)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Stops the render threads. Messages still waiting to be rendered are
    /// sent unchanged.
    pub fn shutdown(mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
        }
        info!("Chat pipeline stopped");
    }
}

impl Drop for ChatPipeline {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
