// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LogClient - data log client model

use heapless::Vec;

use crate::buffer::ReassemblyBuffer;
use crate::config::{FlowControl, LogConfig, DEFAULT_CAPACITY};
use crate::entry::LogEntry;
use crate::error::{Error, Result};
use crate::observer::ClientObserver;
use crate::timer::{Scheduler, Timer, TimerHandle, TimerMode};
use crate::transport::{ModelTransport, Received};
use crate::wire::{property_payload, Opcode, SegmentHeader, PLACEHOLDER_LEN};

/// Status responses waiting for the response timer
const MAX_PENDING_ACKS: usize = 8;

/// Reception state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Nothing in flight
    Idle,
    /// Segments are arriving
    Busy,
    /// Last reception completed, buffer holds the log
    Complete,
}

#[derive(Debug, Default)]
struct ClientTimers {
    receive_timeout: Option<TimerHandle>,
    response: Option<TimerHandle>,
}

/// Data log client
///
/// Reassembles segmented logs, drops re-delivered transmissions and sends
/// remote configuration commands.
#[derive(Debug)]
pub struct LogClient<E, T, S, O, const N: usize = DEFAULT_CAPACITY>
where
    E: LogEntry,
    T: ModelTransport,
    S: Scheduler,
    O: ClientObserver<E>,
{
    config: LogConfig,
    transport: T,
    scheduler: S,
    observer: O,
    rx: ReassemblyBuffer<E, N>,
    state: ReceiveState,
    last_transmission: Option<u8>,
    pending_acks: Vec<u16, MAX_PENDING_ACKS>,
    timers: ClientTimers,
    initialized: bool,
}

impl<E, T, S, O, const N: usize> LogClient<E, T, S, O, N>
where
    E: LogEntry,
    T: ModelTransport,
    S: Scheduler,
    O: ClientObserver<E>,
{
    /// Create a new client
    pub fn new(config: LogConfig, transport: T, scheduler: S, observer: O) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            transport,
            scheduler,
            observer,
            rx: ReassemblyBuffer::new(),
            state: ReceiveState::Idle,
            last_transmission: None,
            pending_acks: Vec::new(),
            timers: ClientTimers::default(),
            initialized: false,
        })
    }

    /// Register the client model and reset the engine
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            self.deinit()?;
        }

        self.transport
            .init_model(self.config.client_model(), false, &Opcode::TABLE)?;

        self.rx.restart();
        self.state = ReceiveState::Idle;
        self.last_transmission = None;
        self.pending_acks.clear();
        self.initialized = true;
        log::debug!("[client] initialized");
        Ok(())
    }

    /// Stop every timer and deregister the client model
    pub fn deinit(&mut self) -> Result<()> {
        if let Some(handle) = self.timers.receive_timeout.take() {
            self.cancel(handle);
        }
        if let Some(handle) = self.timers.response.take() {
            self.cancel(handle);
        }

        self.pending_acks.clear();
        self.state = ReceiveState::Idle;
        self.initialized = false;
        self.transport.deinit_model(self.config.client_model())
    }

    /// Handle an inbound message
    ///
    /// Messages for another model and opcodes the client does not handle
    /// are ignored.
    pub fn on_message(&mut self, msg: &Received<'_>) -> Result<()> {
        if msg.model != self.config.client_model() {
            return Ok(());
        }
        self.ensure_initialized()?;

        match Opcode::try_from(msg.opcode) {
            Ok(Opcode::Status) => self.on_segment(msg),
            Ok(Opcode::Sample) => {
                if msg.payload.len() < E::SIZE {
                    return Err(Error::InvalidData);
                }
                let sample = E::decode(&msg.payload[..E::SIZE]);
                self.observer.on_sample_received(msg.source, sample);
                Ok(())
            }
            _ => {
                log::debug!("[client] opcode 0x{:02x} ignored", msg.opcode);
                Ok(())
            }
        }
    }

    /// Handle a timer expiry
    pub fn on_timer(&mut self, timer: Timer) -> Result<()> {
        match timer {
            Timer::ReceiveTimeout => {
                self.timers.receive_timeout = None;
                if self.state == ReceiveState::Busy {
                    self.rx.restart();
                    self.state = ReceiveState::Idle;
                    log::warn!("[client] reception timed out, abandoned");
                    self.observer.on_receive_timeout();
                }
                Ok(())
            }
            Timer::Response => {
                self.timers.response = None;
                self.flush_acks()
            }
            _ => Ok(()),
        }
    }

    /// Ask servers to report every `ms` milliseconds
    pub fn set_period(&mut self, ms: u32) -> Result<()> {
        self.publish_property(Opcode::Period, &ms.to_le_bytes())
    }

    /// Ask servers to sample every `ms` milliseconds
    pub fn set_sample_rate(&mut self, ms: u32) -> Result<()> {
        self.publish_property(Opcode::SampleRate, &ms.to_le_bytes())
    }

    /// Set the servers' threshold
    pub fn set_threshold(&mut self, value: i8) -> Result<()> {
        self.publish_property(Opcode::Threshold, &value.to_le_bytes())
    }

    /// Ask one server for its current sample
    pub fn request_sample(&mut self, destination: u16) -> Result<()> {
        self.ensure_initialized()?;
        self.transport.send(
            self.config.client_model(),
            destination,
            Opcode::SampleRequest.code(),
            &[0u8; PLACEHOLDER_LEN],
        )
    }

    /// Discard the received log
    pub fn reset_log(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.state == ReceiveState::Busy {
            return Err(Error::Busy);
        }
        self.rx.restart();
        self.state = ReceiveState::Idle;
        Ok(())
    }

    /// Reception state
    pub const fn state(&self) -> ReceiveState {
        self.state
    }

    /// Counter of the last completed transmission
    pub const fn last_transmission(&self) -> Option<u8> {
        self.last_transmission
    }

    /// Received log
    ///
    /// Only meaningful in [`ReceiveState::Complete`].
    pub fn log(&self) -> &ReassemblyBuffer<E, N> {
        &self.rx
    }

    /// Number of status responses waiting to be sent
    pub fn pending_acks(&self) -> usize {
        self.pending_acks.len()
    }

    /// Check if `init()` was called
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
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

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn on_segment(&mut self, msg: &Received<'_>) -> Result<()> {
        let header = SegmentHeader::decode(msg.payload, self.config.flow_control)?;
        let data = &msg.payload[header.len()..];

        if self.state != ReceiveState::Busy {
            self.rx.restart();
            self.timers.receive_timeout = Some(self.scheduler.schedule(
                Timer::ReceiveTimeout,
                self.config.receive_timeout_ms,
                TimerMode::OneShot,
            )?);
            self.state = ReceiveState::Busy;
            log::debug!("[client] reception started from 0x{:04x}", msg.source);
        }

        if let Err(e) = self.rx.extend(data) {
            log::warn!("[client] segment does not fit, reception abandoned");
            self.abandon();
            return Err(e);
        }

        // The ack of a last segment completes the server's transmission,
        // so it is only queued once the log was accepted.
        if header.last {
            self.finish(msg, header)?;
        }
        if self.config.flow_control == FlowControl::AckPerSegment {
            self.queue_ack(msg.source)?;
        }
        Ok(())
    }

    fn finish(&mut self, msg: &Received<'_>, header: SegmentHeader) -> Result<()> {
        if let Some(handle) = self.timers.receive_timeout.take() {
            self.cancel(handle);
        }

        if self.rx.has_partial() {
            log::warn!("[client] last segment ends inside an entry, reception abandoned");
            self.rx.restart();
            self.state = ReceiveState::Idle;
            return Err(Error::InvalidData);
        }

        if header.transmission.is_some() && header.transmission == self.last_transmission {
            log::debug!(
                "[client] transmission {:?} already received, dropped",
                header.transmission
            );
            self.rx.restart();
            self.state = ReceiveState::Idle;
            return Ok(());
        }

        self.rx.set_provenance(msg.source, msg.destination);
        self.state = ReceiveState::Complete;
        if header.transmission.is_some() {
            self.last_transmission = header.transmission;
        }

        log::info!(
            "[client] received {} entries from 0x{:04x}",
            self.rx.len(),
            msg.source
        );
        self.observer.on_log_received(self.rx.view());
        Ok(())
    }

    fn abandon(&mut self) {
        if let Some(handle) = self.timers.receive_timeout.take() {
            self.cancel(handle);
        }
        self.rx.restart();
        self.state = ReceiveState::Idle;
    }

    fn queue_ack(&mut self, destination: u16) -> Result<()> {
        if self.pending_acks.push(destination).is_err() {
            log::warn!("[client] status response queue full, ack dropped");
            return Ok(());
        }

        if self.timers.response.is_none() {
            self.timers.response = Some(self.scheduler.schedule(
                Timer::Response,
                self.config.response_delay_ms,
                TimerMode::OneShot,
            )?);
        }
        Ok(())
    }

    /// Send every queued status response
    ///
    /// All queued responses are attempted; the first failure is returned.
    fn flush_acks(&mut self) -> Result<()> {
        let mut result = Ok(());
        let model = self.config.client_model();

        for destination in core::mem::take(&mut self.pending_acks) {
            if let Err(e) = self.transport.send(
                model,
                destination,
                Opcode::StatusResponse.code(),
                &[0u8; PLACEHOLDER_LEN],
            ) {
                log::warn!("[client] status response to 0x{:04x} failed: {}", destination, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn publish_property(&mut self, opcode: Opcode, value: &[u8]) -> Result<()> {
        self.ensure_initialized()?;
        let payload = property_payload(value)?;
        self.transport
            .publish(self.config.client_model(), opcode.code(), &payload)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Err(e) = self.scheduler.cancel(handle) {
            log::warn!("[client] timer cancel failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReceivedLog;
    use crate::entry::ClimateSample;
    use crate::timer::VirtualScheduler;
    use crate::transport::QueueTransport;

    const SERVER: u16 = 0x0002;

    #[derive(Debug, Default)]
    struct Recorder {
        logs: usize,
        last_entries: heapless::Vec<u8, 16>,
        last_source: u16,
        samples: heapless::Vec<(u16, u8), 4>,
        timeouts: usize,
    }

    impl ClientObserver<u8> for Recorder {
        fn on_log_received(&mut self, log: ReceivedLog<'_, u8>) {
            self.logs += 1;
            self.last_source = log.source;
            self.last_entries = heapless::Vec::from_slice(log.entries).unwrap();
        }

        fn on_sample_received(&mut self, source: u16, sample: u8) {
            let _ = self.samples.push((source, sample));
        }

        fn on_receive_timeout(&mut self) {
            self.timeouts += 1;
        }
    }

    type TestClient = LogClient<u8, QueueTransport<16>, VirtualScheduler<4>, Recorder, 16>;

    fn client(config: LogConfig) -> TestClient {
        let mut client = LogClient::new(
            config,
            QueueTransport::new(),
            VirtualScheduler::new(),
            Recorder::default(),
        )
        .unwrap();
        client.init().unwrap();
        client
    }

    fn status<'a>(config: &LogConfig, payload: &'a [u8]) -> Received<'a> {
        Received {
            source: SERVER,
            destination: 0xC000,
            model: config.client_model(),
            opcode: Opcode::Status.code(),
            payload,
        }
    }

    #[test]
    fn test_counter_mode_reassembly() {
        let config = LogConfig::default();
        let mut client = client(config.clone());

        client.on_message(&status(&config, &[0, 7, 1, 2])).unwrap();
        assert_eq!(client.state(), ReceiveState::Busy);

        client.on_message(&status(&config, &[1, 7, 3])).unwrap();
        assert_eq!(client.state(), ReceiveState::Complete);
        assert_eq!(client.last_transmission(), Some(7));
        assert_eq!(client.observer().logs, 1);
        assert_eq!(client.observer().last_entries.as_slice(), &[1, 2, 3]);
        assert_eq!(client.log().source(), SERVER);
        assert_eq!(client.log().destination(), 0xC000);

        // No timer left behind
        assert_eq!(client.scheduler().pending(), 0);
    }

    #[test]
    fn test_duplicate_transmission_dropped() {
        let config = LogConfig::default();
        let mut client = client(config.clone());

        client.on_message(&status(&config, &[1, 3, 9])).unwrap();
        assert_eq!(client.observer().logs, 1);

        client.on_message(&status(&config, &[1, 3, 9])).unwrap();
        assert_eq!(client.state(), ReceiveState::Idle);
        assert_eq!(client.observer().logs, 1);

        client.on_message(&status(&config, &[1, 4, 8])).unwrap();
        assert_eq!(client.state(), ReceiveState::Complete);
        assert_eq!(client.observer().logs, 2);
    }

    #[test]
    fn test_receive_timeout() {
        let config = LogConfig::builder().receive_timeout_ms(50).build();
        let mut client = client(config.clone());

        client.on_message(&status(&config, &[0, 1, 5, 6])).unwrap();
        client.scheduler_mut().advance(50);
        let timer = client.scheduler_mut().poll().unwrap();
        client.on_timer(timer).unwrap();

        assert_eq!(client.state(), ReceiveState::Idle);
        assert!(client.log().is_empty());
        assert_eq!(client.observer().timeouts, 1);

        // Next reception starts clean
        client.on_message(&status(&config, &[1, 1, 7])).unwrap();
        assert_eq!(client.observer().last_entries.as_slice(), &[7]);
    }

    #[test]
    fn test_overflow_abandons() {
        let config = LogConfig::default();
        let mut client = client(config.clone());

        let mut segment = [0u8; 20];
        assert_eq!(
            client.on_message(&status(&config, &segment)),
            Err(Error::Full)
        );
        assert_eq!(client.state(), ReceiveState::Idle);

        segment[0] = 1;
        assert_eq!(client.on_message(&status(&config, &segment[..18])), Ok(()));
        assert_eq!(client.log().len(), 16);
    }

    #[test]
    fn test_truncated_segment() {
        let config = LogConfig::default();
        let mut client = client(config.clone());

        assert_eq!(
            client.on_message(&status(&config, &[1])),
            Err(Error::InvalidData)
        );
        assert_eq!(client.state(), ReceiveState::Idle);
    }

    #[test]
    fn test_ack_mode_queues_responses() {
        let config = LogConfig::builder()
            .flow_control(FlowControl::AckPerSegment)
            .response_delay_ms(5)
            .build();
        let mut client = client(config.clone());

        client.on_message(&status(&config, &[0, 1, 2])).unwrap();
        assert_eq!(client.pending_acks(), 1);
        assert!(client.transport().is_empty());

        client.scheduler_mut().advance(5);
        assert_eq!(client.scheduler_mut().poll(), Some(Timer::Response));
        client.on_timer(Timer::Response).unwrap();

        let ack = client.transport_mut().pop().unwrap();
        assert_eq!(ack.destination, Some(SERVER));
        assert_eq!(ack.opcode, Opcode::StatusResponse.code());
        assert_eq!(client.pending_acks(), 0);

        // Ack mode has no counter: every last segment completes
        client.on_message(&status(&config, &[1, 3])).unwrap();
        client.on_message(&status(&config, &[1, 3])).unwrap();
        assert_eq!(client.observer().logs, 2);
    }

    #[test]
    fn test_ack_mode_no_ack_for_misaligned_last_segment() {
        let config = LogConfig::builder()
            .flow_control(FlowControl::AckPerSegment)
            .build();
        let mut client: LogClient<ClimateSample, QueueTransport<4>, VirtualScheduler<4>, _, 8> =
            LogClient::new(
                config.clone(),
                QueueTransport::new(),
                VirtualScheduler::new(),
                crate::observer::NoopObserver,
            )
            .unwrap();
        client.init().unwrap();

        // Half an entry, flagged last
        assert_eq!(
            client.on_message(&status(&config, &[1, 20])),
            Err(Error::InvalidData)
        );
        assert_eq!(client.state(), ReceiveState::Idle);
        assert_eq!(client.pending_acks(), 0);
        assert_eq!(client.scheduler().pending(), 0);
    }

    #[test]
    fn test_sample_push() {
        let config = LogConfig::default();
        let mut client = client(config.clone());

        let msg = Received {
            opcode: Opcode::Sample.code(),
            ..status(&config, &[33])
        };
        client.on_message(&msg).unwrap();
        assert_eq!(client.observer().samples.as_slice(), &[(SERVER, 33)]);

        let empty = Received {
            opcode: Opcode::Sample.code(),
            ..status(&config, &[])
        };
        assert_eq!(client.on_message(&empty), Err(Error::InvalidData));
    }

    #[test]
    fn test_property_commands() {
        let mut client = client(LogConfig::default());

        client.set_period(2500).unwrap();
        client.set_threshold(-3).unwrap();
        client.request_sample(SERVER).unwrap();

        let period = client.transport_mut().pop().unwrap();
        assert_eq!(period.opcode, Opcode::Period.code());
        assert_eq!(period.destination, None);
        assert_eq!(period.payload.as_slice(), &2500u32.to_le_bytes());

        let threshold = client.transport_mut().pop().unwrap();
        assert_eq!(threshold.payload.as_slice(), &[0xFD]);

        let request = client.transport_mut().pop().unwrap();
        assert_eq!(request.destination, Some(SERVER));
        assert_eq!(request.opcode, Opcode::SampleRequest.code());
    }

    #[test]
    fn test_transport_failure_propagates() {
        let mut client = client(LogConfig::default());
        client.transport_mut().fail_next(0x0002);
        assert_eq!(client.set_sample_rate(10), Err(Error::Transport(0x0002)));
    }

    #[test]
    fn test_reset_log() {
        let config = LogConfig::default();
        let mut client = client(config.clone());

        client.on_message(&status(&config, &[0, 1, 5])).unwrap();
        assert_eq!(client.reset_log(), Err(Error::Busy));

        client.on_message(&status(&config, &[1, 1, 6])).unwrap();
        client.reset_log().unwrap();
        assert_eq!(client.state(), ReceiveState::Idle);
        assert!(client.log().is_empty());
    }

    #[test]
    fn test_not_initialized() {
        let mut client: TestClient = LogClient::new(
            LogConfig::default(),
            QueueTransport::new(),
            VirtualScheduler::new(),
            Recorder::default(),
        )
        .unwrap();

        assert_eq!(client.reset_log(), Err(Error::NotInitialized));
        assert_eq!(client.set_period(10), Err(Error::NotInitialized));
    }

    #[test]
    fn test_dangling_partial_entry() {
        let config = LogConfig::default();
        let mut client: LogClient<ClimateSample, QueueTransport<4>, VirtualScheduler<4>, _, 8> =
            LogClient::new(
                config.clone(),
                QueueTransport::new(),
                VirtualScheduler::new(),
                crate::observer::NoopObserver,
            )
            .unwrap();
        client.init().unwrap();

        assert_eq!(
            client.on_message(&status(&config, &[1, 0, 20, 50, 21])),
            Err(Error::InvalidData)
        );
        assert_eq!(client.state(), ReceiveState::Idle);
    }
}
