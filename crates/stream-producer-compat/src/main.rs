// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, future::Future, sync::Arc, time::Duration};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use stream_producer::{http_putter::HttpPutter, Producer, ProducerConfig};

const DEFAULT_ENDPOINT: &str = "http://localhost:4566";
const DEFAULT_PARTITION_KEY: &str = "stream-producer-compat";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("PRODUCER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let endpoint = env::var("PRODUCER_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let partition_key = env::var("PRODUCER_PARTITION_KEY")
        .ok()
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| DEFAULT_PARTITION_KEY.to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ProducerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating producer config: {e}");
            return;
        }
    };

    let client = match HttpPutter::new(endpoint.clone(), HTTP_TIMEOUT) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Error creating http client: {e}");
            return;
        }
    };

    let producer = match Producer::new(config, client) {
        Ok(producer) => producer,
        Err(e) => {
            error!("Error creating producer: {e}");
            return;
        }
    };

    // stands in for the host application's record keeping of lost data
    let failures = producer.notify_failures();
    let recorder = tokio::spawn(async move {
        let mut lost = 0usize;
        while let Some(failure) = failures.recv().await {
            lost += 1;
            warn!(
                partition_key = %failure.partition_key,
                bytes = failure.data.len(),
                "{failure}"
            );
        }
        lost
    });

    if let Err(e) = producer.start() {
        error!("Error starting producer: {e}");
        return;
    }
    info!(%endpoint, stream = %producer.config().stream_name, "forwarding stdin lines");

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error listening for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        info!("interrupted");
    };
    let sent = forward_lines(
        &producer,
        BufReader::new(io::stdin()),
        &partition_key,
        interrupt,
    )
    .await;

    if let Err(e) = producer.stop().await {
        error!("Error stopping producer: {e}");
    }
    match recorder.await {
        Ok(lost) => info!(sent, lost, "producer stopped"),
        Err(e) => error!("failure recorder task failed: {e}"),
    }
}

/// Puts every non-empty line of `reader` until it is exhausted or `interrupt`
/// resolves, including while a put is blocked on a full backlog. Returns the
/// number of lines accepted.
async fn forward_lines<R, F>(
    producer: &Producer,
    reader: R,
    partition_key: &str,
    interrupt: F,
) -> usize
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let mut lines = reader.lines();
    let mut sent = 0usize;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut interrupt => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                error!("Error reading stdin: {e}");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }
        tokio::select! {
            result = producer.put(line, partition_key.to_string()) => match result {
                Ok(()) => sent += 1,
                Err(e) => error!("Error putting record: {e}"),
            },
            _ = &mut interrupt => break,
        }
    }
    sent
}
