// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated mesh link and node wiring

use meshlog::properties::Storage;
use meshlog::transport::Outgoing;
use meshlog::{
    ClientObserver, ClimateSample, LogClient, LogServer, Properties, QueueTransport, RamStorage,
    Received, ReceivedLog, ServerObserver, VirtualScheduler,
};
use meshlog_persistence::SqliteStorage;

/// Unicast address of the simulated server node
pub const SERVER_ADDR: u16 = 0x0002;

/// Unicast address of the simulated client node
pub const CLIENT_ADDR: u16 = 0x0003;

/// Group address servers publish to
pub const GROUP_ADDR: u16 = 0xC000;

/// Outbox depth, enough for a full log at the smallest segment size
const OUTBOX: usize = 256;

pub type SimServer =
    LogServer<ClimateSample, QueueTransport<OUTBOX>, VirtualScheduler<8>, NodeStorage, Sensor>;
pub type SimClient = LogClient<ClimateSample, QueueTransport<OUTBOX>, VirtualScheduler<8>, Collector>;

/// Properties storage of the server node
pub enum NodeStorage {
    /// Lost on exit
    Ram(RamStorage<2>),
    /// Backed by a database file
    Sqlite(SqliteStorage),
}

impl Storage for NodeStorage {
    fn contains(&mut self, key: u16) -> meshlog::Result<bool> {
        match self {
            NodeStorage::Ram(s) => s.contains(key),
            NodeStorage::Sqlite(s) => s.contains(key),
        }
    }

    fn read(&mut self, key: u16, buf: &mut [u8]) -> meshlog::Result<usize> {
        match self {
            NodeStorage::Ram(s) => s.read(key, buf),
            NodeStorage::Sqlite(s) => s.read(key, buf),
        }
    }

    fn write(&mut self, key: u16, value: &[u8]) -> meshlog::Result<()> {
        match self {
            NodeStorage::Ram(s) => s.write(key, value),
            NodeStorage::Sqlite(s) => s.write(key, value),
        }
    }

    fn delete(&mut self, key: u16) -> meshlog::Result<()> {
        match self {
            NodeStorage::Ram(s) => s.delete(key),
            NodeStorage::Sqlite(s) => s.delete(key),
        }
    }
}

/// Drifting temperature/humidity source
pub struct Sensor {
    rng: fastrand::Rng,
    current: ClimateSample,
    pub full: u64,
    pub overflow: u64,
    pub completed: u64,
    pub timeouts: u64,
}

impl Sensor {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            current: ClimateSample::new(21, 45),
            full: 0,
            overflow: 0,
            completed: 0,
            timeouts: 0,
        }
    }

    /// Last produced reading
    pub fn current(&self) -> ClimateSample {
        self.current
    }
}

impl ServerObserver<ClimateSample> for Sensor {
    fn sample(&mut self) -> Option<ClimateSample> {
        let temperature = self.current.temperature + self.rng.i8(-1..=1);
        let humidity = self.current.humidity.saturating_add_signed(self.rng.i8(-2..=2));
        self.current = ClimateSample::new(temperature.clamp(-40, 85), humidity.min(100));
        Some(self.current)
    }

    fn current_sample(&mut self) -> Option<ClimateSample> {
        Some(self.current)
    }

    fn on_full(&mut self) {
        self.full += 1;
    }

    fn on_overflow(&mut self) {
        self.overflow += 1;
    }

    fn on_send_complete(&mut self, _transmission: u8) {
        self.completed += 1;
    }

    fn on_send_timeout(&mut self) {
        self.timeouts += 1;
    }

    fn on_properties_changed(&mut self, properties: &Properties) {
        println!(
            "  [server] properties now: sample {} ms, period {} ms, threshold {}",
            properties.sample_rate_ms, properties.period_ms, properties.threshold
        );
    }
}

/// Client-side log sink
#[derive(Default)]
pub struct Collector {
    pub now: u64,
    pub logs: u64,
    pub entries: u64,
    pub samples: u64,
    pub timeouts: u64,
    pub verbose: bool,
}

impl ClientObserver<ClimateSample> for Collector {
    fn on_log_received(&mut self, log: ReceivedLog<'_, ClimateSample>) {
        self.logs += 1;
        self.entries += log.entries.len() as u64;

        if self.verbose {
            let first = log.entries.first().copied().unwrap_or_default();
            let last = log.entries.last().copied().unwrap_or_default();
            println!(
                "  t={:>7} ms  log from 0x{:04x} -> 0x{:04x}: {:>3} entries, {}C/{}% .. {}C/{}%",
                self.now,
                log.source,
                log.destination,
                log.entries.len(),
                first.temperature,
                first.humidity,
                last.temperature,
                last.humidity
            );
        }
    }

    fn on_sample_received(&mut self, source: u16, sample: ClimateSample) {
        self.samples += 1;
        if self.verbose {
            println!(
                "  t={:>7} ms  sample from 0x{:04x}: {}C/{}%",
                self.now, source, sample.temperature, sample.humidity
            );
        }
    }

    fn on_receive_timeout(&mut self) {
        self.timeouts += 1;
    }
}

/// Link counters
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkStats {
    pub delivered: u64,
    pub dropped: u64,
    pub replayed: u64,
}

/// Lossy link between the two nodes
///
/// Every message is dropped with probability `loss`. After the last
/// segment of a transmission, the whole transmission is delivered a second
/// time with probability `duplicate`.
pub struct Link {
    rng: fastrand::Rng,
    loss: f64,
    duplicate: f64,
    burst: Vec<Outgoing>,
    pub stats: LinkStats,
}

impl Link {
    pub fn new(seed: u64, loss: f64, duplicate: f64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            loss,
            duplicate,
            burst: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    /// Deliver everything the server queued
    pub fn server_to_client(&mut self, server: &mut SimServer, client: &mut SimClient) {
        let status = meshlog::Opcode::Status.code();

        while let Some(out) = server.transport_mut().pop() {
            let is_status = out.opcode == status;
            let is_last = is_status && out.payload.first() == Some(&1);
            if is_status {
                self.burst.push(out.clone());
            }

            self.deliver_to_client(&out, client);

            if is_last {
                let burst = std::mem::take(&mut self.burst);
                if self.rng.f64() < self.duplicate {
                    self.stats.replayed += 1;
                    log::debug!("replaying transmission ({} segments)", burst.len());
                    for segment in &burst {
                        self.deliver_to_client(segment, client);
                    }
                }
            }
        }
    }

    /// Deliver everything the client queued
    pub fn client_to_server(&mut self, client: &mut SimClient, server: &mut SimServer) {
        let model = server.config().server_model();

        while let Some(out) = client.transport_mut().pop() {
            if self.lost() {
                continue;
            }
            let msg = Received {
                source: CLIENT_ADDR,
                destination: out.destination.unwrap_or(GROUP_ADDR),
                model,
                opcode: out.opcode,
                payload: &out.payload,
            };
            if let Err(e) = server.on_message(&msg) {
                log::warn!("server rejected opcode 0x{:02x}: {}", out.opcode, e);
            }
        }
    }

    fn deliver_to_client(&mut self, out: &Outgoing, client: &mut SimClient) {
        if self.lost() {
            return;
        }
        let msg = Received {
            source: SERVER_ADDR,
            destination: out.destination.unwrap_or(GROUP_ADDR),
            model: client.config().client_model(),
            opcode: out.opcode,
            payload: &out.payload,
        };
        if let Err(e) = client.on_message(&msg) {
            log::debug!("client dropped opcode 0x{:02x}: {}", out.opcode, e);
        }
    }

    fn lost(&mut self) -> bool {
        if self.rng.f64() < self.loss {
            self.stats.dropped += 1;
            true
        } else {
            self.stats.delivered += 1;
            false
        }
    }
}
