//! The monitor supervisor.
//!
//! Owns every task in the process: the discovery listener, one monitor per
//! configured printer, and the startup-thread reply watcher. Shutdown is
//! first-completion-wins: the moment any load-bearing task ends (or a
//! termination signal fires) the shared token is cancelled and everything is
//! drained under a bounded grace period.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use kiln_bambu::{discover_devices, BambuDevice, BambuError, BambuMqttSubscription};
use kiln_slack::{SlackClient, SlackMessage, DEFAULT_POLL_INTERVAL};
use kiln_track::{advance, render, JobPhase, JobState, Transition};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::logs::ReportLog;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const DEVICE_QUEUE_DEPTH: usize = 16;

/// Run the monitor until a signal or a fatal failure stops it.
pub async fn run(config: Config, log_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    install_signal_handler(token.clone());

    let slack = config.slack.access_token.clone().map(SlackClient::new);
    let status_channel = config.slack.error_notification_channel.clone();
    let print_channel = config.slack.print_notification_channel.clone();
    let startup_ts = notify_startup(slack.as_ref(), status_channel.as_deref()).await;

    let (device_tx, mut device_rx) = mpsc::channel(DEVICE_QUEUE_DEPTH);

    // Load-bearing tasks: any of them ending takes the process down.
    let mut core: JoinSet<(&'static str, anyhow::Result<()>)> = JoinSet::new();
    {
        let token = token.clone();
        core.spawn(async move {
            let result = discover_devices(device_tx, token).await;
            ("discovery", result.map_err(Into::into))
        });
    }
    if let (Some(client), Some(channel), Some(ts)) =
        (slack.clone(), status_channel, startup_ts)
    {
        let token = token.clone();
        core.spawn(async move {
            run_echo_watcher(client, channel, ts, token).await;
            ("reply watcher", Ok(()))
        });
    }

    // One monitor per printer serial; completion reaps the entry.
    let mut monitors: JoinSet<(String, Result<(), BambuError>)> = JoinSet::new();
    let mut active: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("shutdown requested");
                break;
            }
            Some(finished) = core.join_next() => {
                match finished {
                    Ok((name, Err(e))) => error!("{name} failed: {e:#}"),
                    Ok((name, Ok(()))) => info!("{name} ended"),
                    Err(e) => error!("core task panicked: {e}"),
                }
                break;
            }
            Some(finished) = monitors.join_next() => {
                reap_monitor(finished, &mut active);
            }
            maybe_device = device_rx.recv() => {
                let Some(device) = maybe_device else { break };
                spawn_monitor(
                    device,
                    &config,
                    slack.clone(),
                    print_channel.clone(),
                    log_dir.clone(),
                    &token,
                    &mut monitors,
                    &mut active,
                );
            }
        }
    }

    token.cancel();
    let (leaked_core, leaked_monitors) = tokio::join!(
        drain_with_grace(&mut core, SHUTDOWN_GRACE),
        drain_with_grace(&mut monitors, SHUTDOWN_GRACE),
    );
    let leaked = leaked_core + leaked_monitors;
    if leaked > 0 {
        warn!("{leaked} tasks did not stop within {SHUTDOWN_GRACE:?} and were aborted");
    }
    info!("monitor stopped");
    Ok(())
}

/// Post the startup notification, returning its thread timestamp.
///
/// `None` when the relay or channel is unconfigured, or when the post fails;
/// the monitor runs either way, just without the reply thread.
async fn notify_startup(slack: Option<&SlackClient>, channel: Option<&str>) -> Option<String> {
    let (client, channel) = (slack?, channel?);
    match client
        .post_to_channel(channel, ":mag: kiln monitoring started")
        .await
    {
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!("startup notification failed: {e}");
            None
        }
    }
}

/// Watch the startup thread and echo each human reply back into it.
async fn run_echo_watcher(
    client: SlackClient,
    channel: String,
    parent_ts: String,
    token: CancellationToken,
) {
    let poster = client.clone();
    let reply_channel = channel.clone();
    let reply_parent = parent_ts.clone();
    let handler = move |message: SlackMessage| {
        let client = poster.clone();
        let channel = reply_channel.clone();
        let parent = reply_parent.clone();
        async move {
            if message.user.is_empty() || message.text.is_empty() {
                // Posts with no user are bot messages, our own echoes included.
                return Ok(());
            }
            client
                .post_to_thread(&channel, &parent, &message.text)
                .await
                .map(|_| ())
        }
    };
    client
        .watch_thread(&channel, &parent_ts, None, DEFAULT_POLL_INTERVAL, token, handler)
        .await;
}

/// Match a discovered printer against the configuration.
///
/// Returns the effective device (config may pin the address and rename the
/// log prefix) and its access code, or `None` when the printer has no entry.
fn resolve_device(config: &Config, mut device: BambuDevice) -> Option<(BambuDevice, String)> {
    let printer = config.printers.get(&device.serial)?;
    if let Some(ip) = &printer.ip_address {
        device.ip = ip.clone();
    }
    if let Some(prefix) = &printer.filename_prefix {
        device.filename_prefix = prefix.clone();
    }
    Some((device, printer.access_code.clone()))
}

#[allow(clippy::too_many_arguments)]
fn spawn_monitor(
    device: BambuDevice,
    config: &Config,
    slack: Option<SlackClient>,
    print_channel: Option<String>,
    log_dir: Option<PathBuf>,
    token: &CancellationToken,
    monitors: &mut JoinSet<(String, Result<(), BambuError>)>,
    active: &mut HashSet<String>,
) {
    if active.contains(&device.serial) {
        debug!("monitor for {} already running", device.serial);
        return;
    }
    let serial = device.serial.clone();
    let Some((device, access_code)) = resolve_device(config, device) else {
        info!("no access code configured for {serial}, skipping");
        return;
    };
    active.insert(serial);
    let token = token.clone();
    monitors.spawn(monitor_device(
        device,
        access_code,
        slack,
        print_channel,
        log_dir,
        token,
    ));
}

fn reap_monitor(
    finished: Result<(String, Result<(), BambuError>), JoinError>,
    active: &mut HashSet<String>,
) {
    match finished {
        Ok((serial, Ok(()))) => {
            info!("monitor for {serial} stopped");
            active.remove(&serial);
        }
        Ok((serial, Err(e))) => {
            error!("monitor for {serial} failed: {e}");
            active.remove(&serial);
        }
        Err(e) => error!("a monitor task panicked: {e}"),
    }
}

async fn monitor_device(
    device: BambuDevice,
    access_code: String,
    slack: Option<SlackClient>,
    print_channel: Option<String>,
    log_dir: Option<PathBuf>,
    token: CancellationToken,
) -> (String, Result<(), BambuError>) {
    let serial = device.serial.clone();
    let result = monitor_device_inner(
        &device,
        &access_code,
        slack.as_ref(),
        print_channel.as_deref(),
        log_dir.as_deref(),
        &token,
    )
    .await;
    (serial, result)
}

async fn monitor_device_inner(
    device: &BambuDevice,
    access_code: &str,
    slack: Option<&SlackClient>,
    print_channel: Option<&str>,
    log_dir: Option<&Path>,
    token: &CancellationToken,
) -> Result<(), BambuError> {
    info!("subscribing to {} ({}) at {}", device.name, device.serial, device.ip);
    let mut subscription = BambuMqttSubscription::connect(device, access_code).await?;

    let mut report_log = match log_dir {
        Some(dir) => match ReportLog::open(dir, &device.filename_prefix).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!("cannot open report log for {}: {e}", device.name);
                None
            }
        },
        None => None,
    };

    let mut state = JobState::default();
    let mut thread_ts: Option<String> = None;

    loop {
        let report = tokio::select! {
            _ = token.cancelled() => {
                subscription.shutdown().await;
                return Ok(());
            }
            report = subscription.next_report() => report?,
        };

        if let Some(mut log) = report_log.take() {
            match log.append(&report).await {
                Ok(()) => report_log = Some(log),
                Err(e) => warn!("report log write failed for {}, disabling: {e}", device.name),
            }
        }

        let (next, fired) = advance(&state, &report);
        state = next;
        for transition in fired {
            deliver(slack, print_channel, &mut thread_ts, &device.name, &transition).await;
        }
    }
}

/// Post one transition's notification.
///
/// A job start opens a fresh channel post whose timestamp becomes the job
/// thread; later transitions go into that thread, falling back to the
/// channel when threading fails. Relay failures are logged, never fatal.
async fn deliver(
    slack: Option<&SlackClient>,
    channel: Option<&str>,
    thread_ts: &mut Option<String>,
    device_name: &str,
    transition: &Transition,
) {
    let text = render(device_name, transition, Local::now().naive_local());
    let (Some(client), Some(channel)) = (slack, channel) else {
        debug!("no channel to post message: {text}");
        return;
    };

    let starts_new_job =
        transition.to == JobPhase::Printing && transition.from != JobPhase::Paused;
    if starts_new_job {
        match client.post_to_channel(channel, &text).await {
            Ok(ts) => *thread_ts = Some(ts),
            Err(e) => {
                warn!("failed to notify channel: {e}");
                *thread_ts = None;
            }
        }
        return;
    }

    match thread_ts.as_deref() {
        Some(parent) => {
            if let Err(e) = client.post_to_thread(channel, parent, &text).await {
                warn!("failed to notify thread: {e}");
                if let Err(e) = client.post_to_channel(channel, &text).await {
                    warn!("failed to notify channel as fallback: {e}");
                }
            }
        }
        None => {
            if let Err(e) = client.post_to_channel(channel, &text).await {
                warn!("failed to notify channel: {e}");
            }
        }
    }

    if transition.to == JobPhase::Idle {
        *thread_ts = None;
    }
}

fn install_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Wait for every task in the set, up to `grace`. Returns how many tasks
/// failed to stop in time (they are aborted, not forgotten silently).
async fn drain_with_grace<T: 'static>(set: &mut JoinSet<T>, grace: Duration) -> usize {
    let drain = async {
        while set.join_next().await.is_some() {}
    };
    if tokio::time::timeout(grace, drain).await.is_ok() {
        return 0;
    }
    let leaked = set.len();
    set.abort_all();
    leaked
}
