// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Runs the consensus engine and logs its events until interrupted.

mod cli;
mod config;
mod error;

use std::sync::Arc;

use clap::Parser;
use tangle_consensus::{storage::MemoryStore, types::MilestoneIndex, ConsensusEngine, Snapshot};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use self::{cli::ClArgs, error::Error};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    set_up_logging();

    std::panic::set_hook(Box::new(|p| {
        error!("{}", p);
    }));

    if let Err(e) = run().await {
        error!("{}", e);
    }
}

fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

async fn run() -> Result<(), Error> {
    let args = ClArgs::parse();
    let config = args.get_config()?;
    let total_supply = config.engine.ledger.total_supply;

    let engine = Arc::new(ConsensusEngine::new(config.engine, Arc::new(MemoryStore::new()))?);
    engine.load_snapshot(Snapshot {
        index: MilestoneIndex(0),
        solid_entry_points: Vec::new(),
        balances: [(config.genesis.address, total_supply)].into_iter().collect(),
    })?;

    let events = engine.events();
    log_events(events.subscribe_received_valid_milestone(), |event| {
        info!(index = %event.index, tail = %event.tail, "received valid milestone")
    });
    log_events(events.subscribe_received_invalid_milestone(), |event| {
        warn!(tail = %event.tail, "received invalid milestone: {}", event.reason)
    });
    log_events(events.subscribe_address_spent(), |address| {
        info!(%address, "address spent")
    });
    log_events(events.subscribe_milestone_confirmed(), |summary| {
        info!(
            index = %summary.index,
            included = summary.included.len(),
            conflicting = summary.excluded_conflicting.len(),
            "milestone confirmed"
        )
    });
    log_events(events.subscribe_solid_milestone_changed(), |index| {
        info!(%index, "solid milestone changed")
    });

    info!(
        coordinator = %engine.context().config().coordinator.address,
        "consensus engine running"
    );
    shutdown_signal_listener().await;
    info!("shutting down");
    Ok(())
}

fn log_events<T: Clone + Send + 'static>(
    mut receiver: broadcast::Receiver<T>,
    log: impl Fn(T) + Send + 'static,
) {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log(event),
                Err(RecvError::Lagged(skipped)) => warn!("event log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal_listener() {
    #[cfg(unix)]
    {
        use futures::future;
        use tokio::signal::unix::{signal, Signal, SignalKind};

        // Panic: none of the possible error conditions should happen.
        let mut signals = vec![SignalKind::interrupt(), SignalKind::terminate()]
            .iter()
            .map(|kind| signal(*kind).unwrap())
            .collect::<Vec<Signal>>();
        let signal_futs = signals.iter_mut().map(|signal| Box::pin(signal.recv()));
        let (signal_event, _, _) = future::select_all(signal_futs).await;

        if signal_event.is_none() {
            panic!("Shutdown signal stream failed, channel may have closed.");
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            panic!("Failed to intercept CTRL-C: {:?}.", e);
        }
    }
}
