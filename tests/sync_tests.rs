//! End-to-end master → slave tests over loopback UDP

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use video_sync::channel::{BroadcastPolicy, CommandChannel, CommandListener};
use video_sync::config::Config;
use video_sync::master::{MasterCoordinator, MasterPhase, MasterSettings};
use video_sync::media::SimulatedPlayer;
use video_sync::protocol::CommandMessage;
use video_sync::slave::{start_slave_tasks, SlaveHandle, SlavePhase};

const MASTER_ID: &str = "10.1.1.1";

fn media_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"not really h265").unwrap();
    file
}

fn slave_config() -> Config {
    let env: HashMap<&str, &str> = [
        ("MASTER_ID", MASTER_ID),
        ("PREROLL_MS", "20"),
        ("WATCHDOG_PERIOD_MS", "100"),
        ("WATCHDOG_TIMEOUT_MS", "500"),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
}

fn master_settings(video_path: &str) -> MasterSettings {
    MasterSettings {
        heartbeat_interval: Duration::from_millis(50),
        initial_prepare: Duration::from_millis(150),
        lead_time: Duration::from_millis(200),
        loop_delay: Duration::from_millis(50),
        origin_id: MASTER_ID.to_string(),
        preroll: Duration::from_millis(20),
        start_delay_ms: 0,
        video_path: video_path.to_string(),
    }
}

/// Default timings divided by ten, keeping every ratio between them.
fn scaled_default_config(role: &str, video_path: &str) -> Config {
    let env: HashMap<&str, &str> = [
        ("SYNC_ROLE", role),
        ("MASTER_ID", MASTER_ID),
        ("VIDEO_PATH", video_path),
    ]
    .into_iter()
    .collect();
    let mut config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();

    let t = &mut config.timing;
    t.heartbeat_interval_ms /= 10;
    t.initial_prepare_ms /= 10;
    t.lead_time_ms /= 10;
    t.loop_delay_ms /= 10;
    t.preroll_ms /= 10;
    t.watchdog_period_ms /= 10;
    t.watchdog_timeout_ms /= 10;
    config.broadcast.spacing_ms /= 10;
    config
}

async fn start_slave(shutdown: CancellationToken) -> (SlaveHandle, CommandChannel) {
    start_slave_with(&slave_config(), shutdown).await
}

async fn start_slave_with(
    config: &Config,
    shutdown: CancellationToken,
) -> (SlaveHandle, CommandChannel) {
    let listener = CommandListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let target = listener.local_addr().unwrap();
    let player = SimulatedPlayer::new(Duration::from_secs(60), "black.png");
    let handle = start_slave_tasks(config, player, listener, shutdown);

    let policy = BroadcastPolicy {
        repeat: 2,
        spacing: Duration::from_millis(5),
    };
    let channel = CommandChannel::open(target, policy).await.unwrap();
    (handle, channel)
}

async fn wait_for(phase_rx: &mut watch::Receiver<SlavePhase>, want: SlavePhase, within: Duration) {
    tokio::time::timeout(within, phase_rx.wait_for(|p| *p == want))
        .await
        .unwrap_or_else(|_| panic!("slave never reached {want:?}"))
        .unwrap();
}

#[tokio::test]
async fn test_master_drives_slave_through_loop_and_stop() {
    let video = media_file();
    let path = video.path().to_str().unwrap();
    let slave_shutdown = CancellationToken::new();
    let (mut slave, channel) = start_slave(slave_shutdown.clone()).await;

    let master_shutdown = CancellationToken::new();
    let master_player = SimulatedPlayer::new(Duration::from_millis(400), "black.png");
    let master = MasterCoordinator::new(
        master_settings(path),
        master_player,
        channel,
        master_shutdown.clone(),
    );
    let master_task = tokio::spawn(master.run());

    let within = Duration::from_secs(3);
    wait_for(&mut slave.phase, SlavePhase::Prepared, within).await;
    wait_for(&mut slave.phase, SlavePhase::Playing, within).await;
    // End of media on the master brings the slave back for the next loop
    wait_for(&mut slave.phase, SlavePhase::Prepared, within).await;
    wait_for(&mut slave.phase, SlavePhase::Playing, within).await;

    master_shutdown.cancel();
    master_task.await.unwrap().unwrap();
    wait_for(&mut slave.phase, SlavePhase::Standby, within).await;

    slave_shutdown.cancel();
    slave.task.await.unwrap();
}

#[tokio::test]
async fn test_slave_recovers_after_master_disappears() {
    let video = media_file();
    let path = video.path().to_str().unwrap();
    let slave_shutdown = CancellationToken::new();
    let (mut slave, channel) = start_slave(slave_shutdown.clone()).await;
    let target = channel.target();

    let master = MasterCoordinator::new(
        master_settings(path),
        SimulatedPlayer::new(Duration::from_secs(30), "black.png"),
        channel,
        CancellationToken::new(),
    );
    let crashed = tokio::spawn(master.run());

    let within = Duration::from_secs(3);
    wait_for(&mut slave.phase, SlavePhase::Playing, within).await;

    // No stop is sent: the master simply vanishes
    crashed.abort();
    let _ = crashed.await;
    wait_for(&mut slave.phase, SlavePhase::Standby, within).await;

    // A restarted master is followed from scratch
    let policy = BroadcastPolicy {
        repeat: 2,
        spacing: Duration::from_millis(5),
    };
    let channel = CommandChannel::open(target, policy).await.unwrap();
    let restart_shutdown = CancellationToken::new();
    let restarted = MasterCoordinator::new(
        master_settings(path),
        SimulatedPlayer::new(Duration::from_secs(30), "black.png"),
        channel,
        restart_shutdown.clone(),
    );
    let restarted_task = tokio::spawn(restarted.run());
    wait_for(&mut slave.phase, SlavePhase::Playing, within).await;

    restart_shutdown.cancel();
    restarted_task.await.unwrap().unwrap();
    slave_shutdown.cancel();
    slave.task.await.unwrap();
}

#[tokio::test]
async fn test_superseded_master_is_fenced_out() {
    let video = media_file();
    let path = video.path().to_str().unwrap();
    let slave_shutdown = CancellationToken::new();
    let (mut slave, channel) = start_slave(slave_shutdown.clone()).await;
    let target = channel.target();

    let master_shutdown = CancellationToken::new();
    let master = MasterCoordinator::new(
        master_settings(path),
        SimulatedPlayer::new(Duration::from_secs(30), "black.png"),
        channel,
        master_shutdown.clone(),
    );
    let epoch = master.epoch();
    let master_task = tokio::spawn(master.run());

    wait_for(&mut slave.phase, SlavePhase::Playing, Duration::from_secs(3)).await;

    // An older incarnation of the same master tries to stop playback
    let stale = CommandChannel::open(target, BroadcastPolicy::default())
        .await
        .unwrap();
    stale
        .broadcast(&CommandMessage::stop(MASTER_ID, epoch - 1))
        .await
        .unwrap();
    // And a foreign master on the same port
    stale
        .broadcast(&CommandMessage::stop("10.9.9.9", epoch + 1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*slave.phase.borrow(), SlavePhase::Playing);

    master_shutdown.cancel();
    master_task.await.unwrap().unwrap();
    slave_shutdown.cancel();
    slave.task.await.unwrap();
}

#[tokio::test]
async fn test_slave_stays_prepared_through_default_grace_interval() {
    let video = media_file();
    let path = video.path().to_str().unwrap();
    let slave_config = scaled_default_config("slave", path);
    let master_config = scaled_default_config("master", path);
    assert!(master_config.timing.initial_prepare_ms > slave_config.timing.watchdog_timeout_ms);

    let slave_shutdown = CancellationToken::new();
    let (mut slave, channel) = start_slave_with(&slave_config, slave_shutdown.clone()).await;

    let master_shutdown = CancellationToken::new();
    let master = MasterCoordinator::new(
        MasterSettings::from(&master_config),
        SimulatedPlayer::new(Duration::from_secs(30), "black.png"),
        channel,
        master_shutdown.clone(),
    );
    let mut master_phase = master.subscribe();
    let master_task = tokio::spawn(master.run());

    wait_for(&mut slave.phase, SlavePhase::Prepared, Duration::from_secs(1)).await;
    // Past the watchdog timeout but still inside the grace interval
    tokio::time::sleep(slave_config.timing.watchdog_timeout() + Duration::from_millis(100)).await;
    assert_eq!(*slave.phase.borrow(), SlavePhase::Prepared);

    // The first synchronized start of the first loop is joined
    wait_for(&mut slave.phase, SlavePhase::Playing, Duration::from_secs(2)).await;
    tokio::time::timeout(
        Duration::from_millis(500),
        master_phase.wait_for(|p| *p == MasterPhase::Playing),
    )
    .await
    .expect("master never started")
    .unwrap();

    master_shutdown.cancel();
    master_task.await.unwrap().unwrap();
    slave_shutdown.cancel();
    slave.task.await.unwrap();
}
