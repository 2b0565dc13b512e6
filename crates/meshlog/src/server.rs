// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LogServer - data log server model

use crate::buffer::{Append, LogBuffer};
use crate::config::{FlowControl, LogConfig, DEFAULT_CAPACITY, MAX_MESSAGE_PAYLOAD};
use crate::entry::{LogEntry, MAX_ENTRY_SIZE};
use crate::error::{Error, Result};
use crate::observer::ServerObserver;
use crate::properties::{Properties, PropertiesStore, PropertyUpdate, Storage};
use crate::timer::{Scheduler, Timer, TimerHandle, TimerMode};
use crate::transport::{ModelTransport, Received};
use crate::wire::{decode_interval, decode_threshold, segment_count, Opcode, SegmentHeader};

/// Transmission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// No transmission in flight
    Idle,
    /// Transmission in flight
    Busy {
        /// Byte cursor into the log
        offset: usize,
        /// Segments still to send
        remaining: usize,
    },
}

#[derive(Debug, Default)]
struct ServerTimers {
    sample: Option<TimerHandle>,
    report: Option<TimerHandle>,
    send_timeout: Option<TimerHandle>,
    pacing: Option<TimerHandle>,
}

/// Data log server
///
/// Samples into a [`LogBuffer`] on a periodic timer and sends the whole log
/// as a segmented transmission on another.
///
/// # Example
///
/// ```ignore
/// let mut server: LogServer<u8, _, _, _, _> = LogServer::new(
///     LogConfig::default(),
///     transport,
///     VirtualScheduler::<8>::new(),
///     PropertiesStore::new(RamStorage::<2>::new()),
///     sensor,
/// )?;
///
/// server.init()?;
/// server.start()?;
///
/// // Dispatcher loop
/// while let Some(timer) = server.scheduler_mut().poll() {
///     server.on_timer(timer)?;
/// }
/// ```
#[derive(Debug)]
pub struct LogServer<E, T, S, St, O, const N: usize = DEFAULT_CAPACITY>
where
    E: LogEntry,
    T: ModelTransport,
    S: Scheduler,
    St: Storage,
    O: ServerObserver<E>,
{
    config: LogConfig,
    transport: T,
    scheduler: S,
    store: PropertiesStore<St>,
    observer: O,
    log: LogBuffer<E, N>,
    properties: Properties,
    state: SendState,
    transmission: u8,
    timers: ServerTimers,
    initialized: bool,
}

impl<E, T, S, St, O, const N: usize> LogServer<E, T, S, St, O, N>
where
    E: LogEntry,
    T: ModelTransport,
    S: Scheduler,
    St: Storage,
    O: ServerObserver<E>,
{
    /// Create a new server
    ///
    /// Properties are loaded from `store`, falling back to the config
    /// defaults.
    pub fn new(
        config: LogConfig,
        transport: T,
        scheduler: S,
        mut store: PropertiesStore<St>,
        observer: O,
    ) -> Result<Self> {
        config.validate()?;
        let properties = store.load(config.defaults);

        Ok(Self {
            config,
            transport,
            scheduler,
            store,
            observer,
            log: LogBuffer::new(),
            properties,
            state: SendState::Idle,
            transmission: 0,
            timers: ServerTimers::default(),
            initialized: false,
        })
    }

    /// Register the server model and reset the engine
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            self.deinit()?;
        }

        self.transport
            .init_model(self.config.server_model(), true, &Opcode::TABLE)?;

        self.log.wipe();
        self.state = SendState::Idle;
        self.transmission = 0;
        self.initialized = true;
        log::debug!("[server] initialized, {:?}", self.properties);
        Ok(())
    }

    /// Stop every timer and deregister the server model
    pub fn deinit(&mut self) -> Result<()> {
        for handle in [
            self.timers.sample.take(),
            self.timers.report.take(),
            self.timers.send_timeout.take(),
            self.timers.pacing.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.cancel(handle);
        }

        self.state = SendState::Idle;
        self.initialized = false;
        self.transport.deinit_model(self.config.server_model())
    }

    /// Start the periodic report and sample timers
    ///
    /// Does nothing if already started.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.is_started() {
            return Ok(());
        }

        let report =
            self.scheduler
                .schedule(Timer::Report, self.properties.period_ms, TimerMode::Periodic)?;

        match self.scheduler.schedule(
            Timer::Sample,
            self.properties.sample_rate_ms,
            TimerMode::Periodic,
        ) {
            Ok(sample) => {
                self.timers.report = Some(report);
                self.timers.sample = Some(sample);
                log::info!(
                    "[server] started: sample every {} ms, report every {} ms",
                    self.properties.sample_rate_ms,
                    self.properties.period_ms
                );
                Ok(())
            }
            Err(e) => {
                self.cancel(report);
                Err(e)
            }
        }
    }

    /// Stop the periodic timers
    pub fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.timers.report.take() {
            self.scheduler.cancel(handle)?;
        }
        if let Some(handle) = self.timers.sample.take() {
            self.scheduler.cancel(handle)?;
        }
        log::debug!("[server] stopped");
        Ok(())
    }

    /// Append a sample to the log
    ///
    /// Refused with [`Error::Busy`] while a transmission is in flight.
    pub fn append(&mut self, entry: E) -> Result<Append> {
        self.ensure_initialized()?;
        if self.is_busy() {
            return Err(Error::Busy);
        }

        let outcome = self.log.push(entry);
        match outcome {
            Append::Stored => {}
            Append::Full => {
                log::info!("[server] log full ({} entries)", self.log.len());
                self.observer.on_full();
            }
            Append::Overflow => {
                log::warn!("[server] log overflow, sample dropped");
                self.observer.on_overflow();
            }
        }
        Ok(outcome)
    }

    /// Clear the log
    ///
    /// Refused with [`Error::Busy`] while a transmission is in flight.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.is_busy() {
            return Err(Error::Busy);
        }
        self.log.clear();
        Ok(())
    }

    /// Send the whole log
    ///
    /// In counter mode without pacing the transmission is complete when
    /// this returns.
    pub fn send_status(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.is_busy() {
            log::debug!("[server] send refused, transmission in flight");
            return Err(Error::Busy);
        }
        if self.log.is_empty() {
            log::debug!("[server] send refused, log empty");
            return Err(Error::Empty);
        }

        let count = segment_count(self.log.len(), E::SIZE, self.config.max_segment_payload());
        self.timers.send_timeout = Some(self.scheduler.schedule(
            Timer::SendTimeout,
            self.config.send_timeout_ms,
            TimerMode::OneShot,
        )?);
        self.state = SendState::Busy {
            offset: 0,
            remaining: count,
        };
        log::debug!(
            "[server] transmission {}: {} entries in {} segments",
            self.transmission,
            self.log.len(),
            count
        );

        match self.config.flow_control {
            FlowControl::CounterWithTimeout if self.config.segment_interval_ms == 0 => {
                while self.is_busy() {
                    self.send_handler()?;
                }
                Ok(())
            }
            _ => self.send_handler(),
        }
    }

    /// Publish a single sample outside of the log
    pub fn push_sample(&mut self, entry: E) -> Result<()> {
        self.ensure_initialized()?;
        let mut buf = [0u8; MAX_ENTRY_SIZE];
        entry.encode(&mut buf[..E::SIZE]);
        self.transport
            .publish(self.config.server_model(), Opcode::Sample.code(), &buf[..E::SIZE])
    }

    /// Handle an inbound message
    ///
    /// Messages for another model are ignored.
    pub fn on_message(&mut self, msg: &Received<'_>) -> Result<()> {
        if msg.model != self.config.server_model() {
            return Ok(());
        }
        self.ensure_initialized()?;

        match Opcode::try_from(msg.opcode)? {
            Opcode::Period => {
                let ms = decode_interval(msg.payload)?;
                self.update_property(PropertyUpdate::Period(ms))
            }
            Opcode::SampleRate => {
                let ms = decode_interval(msg.payload)?;
                self.update_property(PropertyUpdate::SampleRate(ms))
            }
            Opcode::Threshold => {
                let value = decode_threshold(msg.payload)?;
                self.update_property(PropertyUpdate::Threshold(value))
            }
            Opcode::StatusResponse => match self.config.flow_control {
                FlowControl::AckPerSegment => self.send_handler(),
                FlowControl::CounterWithTimeout => {
                    log::debug!("[server] status response ignored in counter mode");
                    Ok(())
                }
            },
            Opcode::SampleRequest => self.reply_sample(msg.source),
            Opcode::Status | Opcode::Sample => Err(Error::UnsupportedOpcode(msg.opcode)),
        }
    }

    /// Handle a timer expiry
    pub fn on_timer(&mut self, timer: Timer) -> Result<()> {
        match timer {
            Timer::Sample => {
                if let Some(entry) = self.observer.sample() {
                    if let Err(e) = self.append(entry) {
                        log::debug!("[server] sample refused: {}", e);
                    }
                }
                Ok(())
            }
            Timer::Report => match self.send_status() {
                Err(Error::Empty) | Err(Error::Busy) => Ok(()),
                other => other,
            },
            Timer::SendTimeout => {
                self.timers.send_timeout = None;
                if self.is_busy() {
                    if let Some(handle) = self.timers.pacing.take() {
                        self.cancel(handle);
                    }
                    self.state = SendState::Idle;
                    log::warn!(
                        "[server] transmission {} timed out, abandoned",
                        self.transmission
                    );
                    self.observer.on_send_timeout();
                }
                Ok(())
            }
            Timer::SegmentPacing => {
                self.timers.pacing = None;
                self.send_handler()
            }
            Timer::ReceiveTimeout | Timer::Response => Ok(()),
        }
    }

    /// Delete the persisted properties
    ///
    /// The running properties are kept until the next boot.
    pub fn reset_config(&mut self) -> Result<()> {
        self.store.reset()?;
        log::info!("[server] persisted properties deleted");
        Ok(())
    }

    /// Transmission state
    pub const fn state(&self) -> SendState {
        self.state
    }

    /// Check if a transmission is in flight
    pub const fn is_busy(&self) -> bool {
        matches!(self.state, SendState::Busy { .. })
    }

    /// Counter of the next transmission
    pub const fn transmission(&self) -> u8 {
        self.transmission
    }

    /// Current properties
    pub const fn properties(&self) -> Properties {
        self.properties
    }

    /// Current threshold
    pub const fn threshold(&self) -> i8 {
        self.properties.threshold
    }

    /// Log buffer
    pub fn log(&self) -> &LogBuffer<E, N> {
        &self.log
    }

    /// Check if the periodic timers run
    pub const fn is_started(&self) -> bool {
        self.timers.report.is_some()
    }

    /// Check if `init()` was called
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Handle of the periodic sample timer
    pub const fn sample_timer(&self) -> Option<TimerHandle> {
        self.timers.sample
    }

    /// Handle of the periodic report timer
    pub const fn report_timer(&self) -> Option<TimerHandle> {
        self.timers.report
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Borrow the scheduler
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Mutably borrow the scheduler
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Borrow the observer
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Mutably borrow the observer
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Mutably borrow the properties store
    pub fn store_mut(&mut self) -> &mut PropertiesStore<St> {
        &mut self.store
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Send the next segment, or complete the transmission
    fn send_handler(&mut self) -> Result<()> {
        let SendState::Busy { offset, remaining } = self.state else {
            return Ok(());
        };

        if remaining == 0 {
            self.complete_send();
            return Ok(());
        }

        let last = remaining == 1;
        let header = match self.config.flow_control {
            FlowControl::AckPerSegment => SegmentHeader::ack(last),
            FlowControl::CounterWithTimeout => SegmentHeader::counted(last, self.transmission),
        };

        let mut frame = [0u8; MAX_MESSAGE_PAYLOAD];
        let header_len = header.encode(&mut frame)?;
        let end = header_len + self.config.max_segment_payload();
        let data_len = self.log.copy_bytes(offset, &mut frame[header_len..end]);

        if let Err(e) = self.transport.publish(
            self.config.server_model(),
            Opcode::Status.code(),
            &frame[..header_len + data_len],
        ) {
            log::warn!(
                "[server] segment publish failed ({}), transmission {} aborted",
                e,
                self.transmission
            );
            self.abort_send();
            return Err(e);
        }

        let remaining = remaining - 1;
        self.state = SendState::Busy {
            offset: offset + data_len,
            remaining,
        };

        if self.config.flow_control == FlowControl::CounterWithTimeout {
            if remaining == 0 {
                self.complete_send();
            } else if self.config.segment_interval_ms != 0 {
                match self.scheduler.schedule(
                    Timer::SegmentPacing,
                    self.config.segment_interval_ms,
                    TimerMode::OneShot,
                ) {
                    Ok(handle) => self.timers.pacing = Some(handle),
                    Err(e) => {
                        self.abort_send();
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    fn complete_send(&mut self) {
        if let Some(handle) = self.timers.send_timeout.take() {
            self.cancel(handle);
        }
        if let Some(handle) = self.timers.pacing.take() {
            self.cancel(handle);
        }

        self.log.clear();
        self.state = SendState::Idle;

        let completed = self.transmission;
        self.transmission = self.transmission.wrapping_add(1);
        log::info!("[server] transmission {} complete", completed);
        self.observer.on_send_complete(completed);
    }

    /// Drop the transmission, keep the log
    fn abort_send(&mut self) {
        if let Some(handle) = self.timers.send_timeout.take() {
            self.cancel(handle);
        }
        if let Some(handle) = self.timers.pacing.take() {
            self.cancel(handle);
        }
        self.state = SendState::Idle;
    }

    fn update_property(&mut self, update: PropertyUpdate) -> Result<()> {
        update.validate()?;
        self.store.update(self.properties, update)?;

        self.properties = self.properties.apply(update);
        log::info!("[server] properties updated: {:?}", self.properties);
        self.observer.on_properties_changed(&self.properties);

        let (handle, interval) = match update {
            PropertyUpdate::SampleRate(ms) => (self.timers.sample, ms),
            PropertyUpdate::Period(ms) => (self.timers.report, ms),
            PropertyUpdate::Threshold(_) => return Ok(()),
        };
        if let Some(handle) = handle {
            self.scheduler.reschedule(handle, interval)?;
        }
        Ok(())
    }

    fn reply_sample(&mut self, destination: u16) -> Result<()> {
        let entry = self.observer.current_sample().ok_or(Error::Empty)?;
        let mut buf = [0u8; MAX_ENTRY_SIZE];
        entry.encode(&mut buf[..E::SIZE]);
        self.transport.send(
            self.config.server_model(),
            destination,
            Opcode::Sample.code(),
            &buf[..E::SIZE],
        )
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Err(e) = self.scheduler.cancel(handle) {
            log::warn!("[server] timer cancel failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{RamStorage, PROPERTIES_KEY};
    use crate::timer::VirtualScheduler;
    use crate::transport::QueueTransport;

    #[derive(Debug, Default)]
    struct Recorder {
        next_sample: u8,
        full: usize,
        overflow: usize,
        completed: heapless::Vec<u8, 8>,
        timeouts: usize,
        changes: usize,
    }

    impl ServerObserver<u8> for Recorder {
        fn sample(&mut self) -> Option<u8> {
            self.next_sample = self.next_sample.wrapping_add(1);
            Some(self.next_sample)
        }

        fn current_sample(&mut self) -> Option<u8> {
            Some(42)
        }

        fn on_full(&mut self) {
            self.full += 1;
        }

        fn on_overflow(&mut self) {
            self.overflow += 1;
        }

        fn on_send_complete(&mut self, transmission: u8) {
            let _ = self.completed.push(transmission);
        }

        fn on_send_timeout(&mut self) {
            self.timeouts += 1;
        }

        fn on_properties_changed(&mut self, _properties: &Properties) {
            self.changes += 1;
        }
    }

    type TestServer =
        LogServer<u8, QueueTransport<64>, VirtualScheduler<8>, RamStorage<2>, Recorder, 10>;

    fn server(config: LogConfig) -> TestServer {
        let mut server = LogServer::new(
            config,
            QueueTransport::new(),
            VirtualScheduler::new(),
            PropertiesStore::new(RamStorage::new()),
            Recorder::default(),
        )
        .unwrap();
        server.init().unwrap();
        server
    }

    fn message<'a>(config: &LogConfig, opcode: Opcode, payload: &'a [u8]) -> Received<'a> {
        Received {
            source: 0x0002,
            destination: 0x0001,
            model: config.server_model(),
            opcode: opcode.code(),
            payload,
        }
    }

    #[test]
    fn test_not_initialized() {
        let mut server: TestServer = LogServer::new(
            LogConfig::default(),
            QueueTransport::new(),
            VirtualScheduler::new(),
            PropertiesStore::new(RamStorage::new()),
            Recorder::default(),
        )
        .unwrap();

        assert_eq!(server.append(1), Err(Error::NotInitialized));
        assert_eq!(server.send_status(), Err(Error::NotInitialized));
        assert_eq!(server.start(), Err(Error::NotInitialized));
        assert_eq!(server.reset(), Err(Error::NotInitialized));
    }

    #[test]
    fn test_reset_clears_log() {
        let mut server = server(LogConfig::default());
        for i in 0..4 {
            server.append(i).unwrap();
        }

        server.reset().unwrap();
        assert!(server.log().is_empty());

        // Cursor back at the start
        server.append(7).unwrap();
        assert_eq!(server.log().entries(), &[7]);
    }

    #[test]
    fn test_reset_refused_while_sending() {
        let config = LogConfig::builder()
            .flow_control(FlowControl::AckPerSegment)
            .max_message_payload(3)
            .build();
        let mut server = server(config);
        for i in 0..5 {
            server.append(i).unwrap();
        }
        server.send_status().unwrap();

        assert_eq!(server.reset(), Err(Error::Busy));
        assert!(server.is_busy());
        assert_eq!(server.log().entries(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_append_full_and_overflow() {
        let mut server = server(LogConfig::default());

        for i in 0..9 {
            assert_eq!(server.append(i).unwrap(), Append::Stored);
        }
        assert_eq!(server.append(9).unwrap(), Append::Full);
        assert_eq!(server.append(10).unwrap(), Append::Overflow);

        assert_eq!(server.observer().full, 1);
        assert_eq!(server.observer().overflow, 1);
        assert_eq!(server.log().entries(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_send_empty_log() {
        let mut server = server(LogConfig::default());
        assert_eq!(server.send_status(), Err(Error::Empty));
        assert_eq!(server.state(), SendState::Idle);
        assert!(server.transport().is_empty());
    }

    #[test]
    fn test_counter_mode_sends_everything_at_once() {
        let config = LogConfig::builder().max_message_payload(5).build();
        let mut server = server(config);
        for i in 0..7 {
            server.append(i).unwrap();
        }

        server.send_status().unwrap();

        // 7 bytes over 3-byte segments
        let first = server.transport_mut().pop().unwrap();
        assert_eq!(first.payload.as_slice(), &[0, 0, 0, 1, 2]);
        let second = server.transport_mut().pop().unwrap();
        assert_eq!(second.payload.as_slice(), &[0, 0, 3, 4, 5]);
        let third = server.transport_mut().pop().unwrap();
        assert_eq!(third.payload.as_slice(), &[1, 0, 6]);
        assert!(server.transport().is_empty());

        assert_eq!(server.state(), SendState::Idle);
        assert!(server.log().is_empty());
        assert_eq!(server.transmission(), 1);
        assert_eq!(server.observer().completed.as_slice(), &[0]);
    }

    #[test]
    fn test_ack_mode_one_segment_per_ack() {
        let config = LogConfig::builder()
            .flow_control(FlowControl::AckPerSegment)
            .max_message_payload(4)
            .build();
        let mut server = server(config.clone());
        for i in 0..5 {
            server.append(i).unwrap();
        }

        server.send_status().unwrap();
        assert_eq!(server.transport().len(), 1);
        assert_eq!(server.append(9), Err(Error::Busy));
        assert_eq!(server.send_status(), Err(Error::Busy));

        let ack = message(&config, Opcode::StatusResponse, &[0]);
        server.on_message(&ack).unwrap();
        assert_eq!(server.transport().len(), 2);

        // Ack of the last segment completes the transmission
        server.on_message(&ack).unwrap();
        assert_eq!(server.transport().len(), 2);
        assert_eq!(server.state(), SendState::Idle);
        assert_eq!(server.observer().completed.as_slice(), &[0]);

        let first = server.transport_mut().pop().unwrap();
        assert_eq!(first.payload.as_slice(), &[0, 0, 1, 2]);
        let last = server.transport_mut().pop().unwrap();
        assert_eq!(last.payload.as_slice(), &[1, 3, 4]);
    }

    #[test]
    fn test_paced_counter_mode() {
        let config = LogConfig::builder()
            .max_message_payload(3)
            .segment_interval_ms(20)
            .build();
        let mut server = server(config);
        for i in 0..3 {
            server.append(i).unwrap();
        }

        server.send_status().unwrap();
        assert_eq!(server.transport().len(), 1);
        assert!(server.is_busy());

        server.scheduler_mut().advance(20);
        let timer = server.scheduler_mut().poll().unwrap();
        assert_eq!(timer, Timer::SegmentPacing);
        server.on_timer(timer).unwrap();
        assert_eq!(server.transport().len(), 2);

        server.scheduler_mut().advance(20);
        let timer = server.scheduler_mut().poll().unwrap();
        server.on_timer(timer).unwrap();
        assert_eq!(server.transport().len(), 3);
        assert_eq!(server.state(), SendState::Idle);
    }

    #[test]
    fn test_send_timeout_keeps_log() {
        let config = LogConfig::builder()
            .flow_control(FlowControl::AckPerSegment)
            .max_message_payload(2)
            .send_timeout_ms(100)
            .build();
        let mut server = server(config);
        server.append(1).unwrap();
        server.append(2).unwrap();
        server.send_status().unwrap();

        server.scheduler_mut().advance(100);
        assert_eq!(server.scheduler_mut().poll(), Some(Timer::SendTimeout));
        server.on_timer(Timer::SendTimeout).unwrap();

        assert_eq!(server.state(), SendState::Idle);
        assert_eq!(server.observer().timeouts, 1);
        assert_eq!(server.log().len(), 2);
        assert_eq!(server.transmission(), 0);
    }

    #[test]
    fn test_publish_failure_aborts() {
        let config = LogConfig::builder().max_message_payload(3).build();
        let mut server = server(config);
        for i in 0..3 {
            server.append(i).unwrap();
        }

        server.transport_mut().fail_next(0x0183);
        assert_eq!(server.send_status(), Err(Error::Transport(0x0183)));
        assert_eq!(server.state(), SendState::Idle);
        assert_eq!(server.log().len(), 3);
        assert_eq!(server.scheduler().pending(), 0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut server = server(LogConfig::default());
        server.start().unwrap();
        server.start().unwrap();
        assert_eq!(server.scheduler().pending(), 2);

        server.stop().unwrap();
        assert!(!server.is_started());
        assert_eq!(server.scheduler().pending(), 0);
    }

    #[test]
    fn test_periodic_sampling_and_report() {
        let defaults = Properties {
            sample_rate_ms: 10,
            period_ms: 35,
            threshold: 0,
        };
        let mut server = server(LogConfig::builder().defaults(defaults).build());
        server.start().unwrap();

        server.scheduler_mut().advance_to(35);
        while let Some(timer) = server.scheduler_mut().poll() {
            server.on_timer(timer).unwrap();
        }

        // Three samples, then the report drained them
        assert_eq!(server.observer().completed.as_slice(), &[0]);
        assert!(server.log().is_empty());
        let status = server.transport_mut().pop().unwrap();
        assert_eq!(status.payload.as_slice(), &[1, 0, 1, 2, 3]);
    }

    #[test]
    fn test_remote_period_update() {
        let config = LogConfig::default();
        let mut server = server(config.clone());
        server.start().unwrap();
        let sample_deadline = server
            .scheduler()
            .deadline(server.sample_timer().unwrap());

        server.scheduler_mut().advance_to(400);
        let payload = 2500u32.to_le_bytes();
        let msg = message(&config, Opcode::Period, &payload);
        server.on_message(&msg).unwrap();

        assert_eq!(server.properties().period_ms, 2500);
        assert_eq!(server.observer().changes, 1);
        assert_eq!(
            server.scheduler().deadline(server.report_timer().unwrap()),
            Some(2900)
        );
        assert_eq!(
            server.scheduler().deadline(server.sample_timer().unwrap()),
            sample_deadline
        );

        let stored = server.store_mut().load(Properties::default());
        assert_eq!(stored.period_ms, 2500);
    }

    #[test]
    fn test_remote_update_rejections() {
        let config = LogConfig::default();
        let mut server = server(config.clone());

        let zero = 0u32.to_le_bytes();
        let msg = message(&config, Opcode::SampleRate, &zero);
        assert_eq!(server.on_message(&msg), Err(Error::InvalidParameter));

        let short = [1u8, 2];
        let msg = message(&config, Opcode::Period, &short);
        assert_eq!(server.on_message(&msg), Err(Error::InvalidData));

        let msg = message(&config, Opcode::Status, &[]);
        assert_eq!(
            server.on_message(&msg),
            Err(Error::UnsupportedOpcode(Opcode::Status.code()))
        );

        assert_eq!(server.properties(), Properties::default());
        assert!(!server
            .store_mut()
            .storage_mut()
            .contains(PROPERTIES_KEY)
            .unwrap());
    }

    #[test]
    fn test_threshold_update_and_reset_config() {
        let config = LogConfig::default();
        let mut server = server(config.clone());

        let payload = [0xFBu8, 0, 0, 0];
        let msg = message(&config, Opcode::Threshold, &payload);
        server.on_message(&msg).unwrap();
        assert_eq!(server.threshold(), -5);

        server.reset_config().unwrap();
        assert_eq!(server.threshold(), -5);
        assert_eq!(
            server.store_mut().load(Properties::default()),
            Properties::default()
        );
    }

    #[test]
    fn test_foreign_model_ignored() {
        let config = LogConfig::default();
        let mut server = server(config.clone());
        let msg = Received {
            model: config.client_model(),
            ..message(&config, Opcode::Status, &[])
        };
        assert_eq!(server.on_message(&msg), Ok(()));
    }

    #[test]
    fn test_sample_request_reply() {
        let config = LogConfig::default();
        let mut server = server(config.clone());

        server
            .on_message(&message(&config, Opcode::SampleRequest, &[0]))
            .unwrap();

        let reply = server.transport_mut().pop().unwrap();
        assert_eq!(reply.destination, Some(0x0002));
        assert_eq!(reply.opcode, Opcode::Sample.code());
        assert_eq!(reply.payload.as_slice(), &[42]);
    }

    /// Storage that can no longer be written
    #[derive(Debug, Default)]
    struct ReadOnlyStorage(RamStorage<2>);

    impl Storage for ReadOnlyStorage {
        fn contains(&mut self, key: u16) -> Result<bool> {
            self.0.contains(key)
        }

        fn read(&mut self, key: u16, buf: &mut [u8]) -> Result<usize> {
            self.0.read(key, buf)
        }

        fn write(&mut self, _key: u16, _value: &[u8]) -> Result<()> {
            Err(Error::Storage)
        }

        fn delete(&mut self, key: u16) -> Result<()> {
            self.0.delete(key)
        }
    }

    /// Scheduler whose timers cannot be rescheduled
    #[derive(Debug, Default)]
    struct FrozenScheduler(VirtualScheduler<8>);

    impl Scheduler for FrozenScheduler {
        fn schedule(
            &mut self,
            timer: Timer,
            interval_ms: u32,
            mode: TimerMode,
        ) -> Result<TimerHandle> {
            self.0.schedule(timer, interval_ms, mode)
        }

        fn cancel(&mut self, handle: TimerHandle) -> Result<()> {
            self.0.cancel(handle)
        }

        fn reschedule(&mut self, _handle: TimerHandle, _interval_ms: u32) -> Result<()> {
            Err(Error::Timer)
        }

        fn is_running(&self, handle: TimerHandle) -> bool {
            self.0.is_running(handle)
        }
    }

    #[test]
    fn test_update_storage_failure_leaves_server_untouched() {
        let config = LogConfig::default();
        let mut server: LogServer<u8, QueueTransport<8>, VirtualScheduler<8>, _, _, 10> =
            LogServer::new(
                config.clone(),
                QueueTransport::new(),
                VirtualScheduler::new(),
                PropertiesStore::new(ReadOnlyStorage::default()),
                Recorder::default(),
            )
            .unwrap();
        server.init().unwrap();
        server.start().unwrap();
        server.scheduler_mut().advance_to(300);
        let report_deadline = server
            .scheduler()
            .deadline(server.report_timer().unwrap());

        let payload = 2500u32.to_le_bytes();
        let msg = message(&config, Opcode::Period, &payload);
        assert_eq!(server.on_message(&msg), Err(Error::Storage));

        assert_eq!(server.properties(), Properties::default());
        assert_eq!(server.observer().changes, 0);
        assert_eq!(
            server.scheduler().deadline(server.report_timer().unwrap()),
            report_deadline
        );
    }

    #[test]
    fn test_update_reschedule_failure_reports_timer() {
        let config = LogConfig::default();
        let mut server: LogServer<u8, QueueTransport<8>, FrozenScheduler, _, _, 10> =
            LogServer::new(
                config.clone(),
                QueueTransport::new(),
                FrozenScheduler::default(),
                PropertiesStore::new(RamStorage::<2>::new()),
                Recorder::default(),
            )
            .unwrap();
        server.init().unwrap();
        server.start().unwrap();

        let payload = 250u32.to_le_bytes();
        let msg = message(&config, Opcode::SampleRate, &payload);
        assert_eq!(server.on_message(&msg), Err(Error::Timer));

        // Persisted and applied before the timer was touched
        assert_eq!(server.properties().sample_rate_ms, 250);
        assert_eq!(server.observer().changes, 1);
        let stored = server.store_mut().load(Properties::default());
        assert_eq!(stored.sample_rate_ms, 250);

        // Not started: nothing to reschedule
        server.stop().unwrap();
        let msg = message(&config, Opcode::SampleRate, &payload);
        assert_eq!(server.on_message(&msg), Ok(()));
    }
}
