// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Climate Log Example
//!
//! One server and one client exchanging a segmented log in ack mode, with
//! messages handed over by hand instead of a mesh stack.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example climate_log --features std
//! ```

use meshlog::{
    ClientObserver, ClimateSample, FlowControl, LogClient, LogConfig, LogServer, NoopObserver,
    PropertiesStore, QueueTransport, RamStorage, Received, ReceivedLog, Result, VirtualScheduler,
};

const SERVER_ADDR: u16 = 0x0002;
const CLIENT_ADDR: u16 = 0x0003;

struct Printer;

impl ClientObserver<ClimateSample> for Printer {
    fn on_log_received(&mut self, log: ReceivedLog<'_, ClimateSample>) {
        println!("Received {} samples from 0x{:04x}", log.entries.len(), log.source);
        for (i, sample) in log.entries.iter().enumerate() {
            println!("  #{:02} {:>3} C {:>3} %", i, sample.temperature, sample.humidity);
        }
    }
}

fn main() -> Result<()> {
    // Small messages so the log needs several segments
    let config = LogConfig::builder()
        .flow_control(FlowControl::AckPerSegment)
        .max_message_payload(9)
        .build();

    let mut server: LogServer<ClimateSample, QueueTransport<8>, VirtualScheduler<4>, _, _, 32> =
        LogServer::new(
            config.clone(),
            QueueTransport::new(),
            VirtualScheduler::new(),
            PropertiesStore::new(RamStorage::<2>::new()),
            NoopObserver,
        )?;
    let mut client: LogClient<ClimateSample, QueueTransport<8>, VirtualScheduler<4>, _, 32> =
        LogClient::new(config.clone(), QueueTransport::new(), VirtualScheduler::new(), Printer)?;

    server.init()?;
    client.init()?;

    for i in 0..10i8 {
        server.append(ClimateSample::new(20 + i / 3, 40 + i as u8))?;
    }
    server.send_status()?;

    // Segment -> client, ack -> server, until the server is done
    while server.is_busy() {
        while let Some(out) = server.transport_mut().pop() {
            client.on_message(&Received {
                source: SERVER_ADDR,
                destination: CLIENT_ADDR,
                model: config.client_model(),
                opcode: out.opcode,
                payload: &out.payload,
            })?;
        }

        client.scheduler_mut().advance(u64::from(config.response_delay_ms));
        while let Some(timer) = client.scheduler_mut().poll() {
            client.on_timer(timer)?;
        }

        while let Some(out) = client.transport_mut().pop() {
            server.on_message(&Received {
                source: CLIENT_ADDR,
                destination: out.destination.unwrap_or(SERVER_ADDR),
                model: config.server_model(),
                opcode: out.opcode,
                payload: &out.payload,
            })?;
        }
    }

    println!("Next transmission counter: {}", server.transmission());
    Ok(())
}
