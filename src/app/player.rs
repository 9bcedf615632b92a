use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::error::LaunchError;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const KILL_REAP_WAIT: Duration = Duration::from_secs(1);

pub trait Player {
    fn stop_if_running(&mut self) -> StopOutcome;
    fn launch(&mut self, media: &Path) -> Result<(), LaunchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    AlreadyExited,
    Terminated,
    Killed,
    /// SIGKILL was sent but the process was not reaped in time.
    Abandoned,
}

/// The player process we believe is on screen.
#[derive(Debug)]
pub struct PlayerHandle {
    child: Child,
    media: PathBuf,
    launched_at: Instant,
}

impl PlayerHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

pub struct PlaybackSupervisor {
    program: String,
    args: Vec<String>,
    grace: Duration,
    current: Option<PlayerHandle>,
}

impl PlaybackSupervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>, grace: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            grace,
            current: None,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.stop_grace(),
        )
    }

    pub fn state(&self) -> PlayerState {
        if self.current.is_some() {
            PlayerState::Playing
        } else {
            PlayerState::Idle
        }
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&PlayerHandle> {
        self.current.as_ref()
    }

    fn build_command(&self, media: &Path) -> ProcessCommand {
        let mut cmd = ProcessCommand::new(&self.program);
        cmd.args(&self.args)
            .arg(media)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group: terminal signals aimed at us never reach the
        // player, and stop_if_running can signal the player's children too.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
                libc::signal(libc::SIGQUIT, libc::SIG_DFL);
                libc::signal(libc::SIGTSTP, libc::SIG_DFL);
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd
    }
}

impl Player for PlaybackSupervisor {
    fn stop_if_running(&mut self) -> StopOutcome {
        let Some(mut handle) = self.current.take() else {
            return StopOutcome::NotRunning;
        };
        let pid = handle.pid();
        let media = handle.media.display().to_string();

        match handle.child.try_wait() {
            Ok(Some(status)) => {
                info!(pid, %media, %status, "player had already exited");
                stop_orphaned_group(pid, self.grace);
                return StopOutcome::AlreadyExited;
            }
            Ok(None) => {}
            Err(err) => warn!(pid, error = %err, "could not poll player status"),
        }

        info!(
            pid,
            %media,
            played_for_secs = handle.launched_at.elapsed().as_secs(),
            "terminating player"
        );
        terminate(&mut handle.child);
        if let Some(status) = wait_for_exit(&mut handle.child, self.grace) {
            debug!(pid, %status, "player terminated");
            return StopOutcome::Terminated;
        }

        warn!(
            pid,
            grace_ms = self.grace.as_millis() as u64,
            "player ignored termination, killing"
        );
        kill(&mut handle.child);
        match wait_for_exit(&mut handle.child, KILL_REAP_WAIT) {
            Some(_) => StopOutcome::Killed,
            None => {
                warn!(pid, "player still not reaped after kill; reaping in background");
                reap_in_background(handle.child);
                StopOutcome::Abandoned
            }
        }
    }

    fn launch(&mut self, media: &Path) -> Result<(), LaunchError> {
        if self.state() == PlayerState::Playing {
            self.stop_if_running();
        }

        let child = self
            .build_command(media)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                path: media.to_path_buf(),
                source,
            })?;
        info!(
            pid = child.id(),
            program = %self.program,
            media = %media.display(),
            "player started"
        );
        self.current = Some(PlayerHandle {
            child,
            media: media.to_path_buf(),
            launched_at: Instant::now(),
        });
        Ok(())
    }
}

fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let mut status = None;
    poll_until(limit, || match child.try_wait() {
        Ok(Some(exited)) => {
            status = Some(exited);
            true
        }
        Ok(None) => false,
        Err(_) => true,
    });
    status
}

/// Polls `done` until it returns true or `limit` passes. Returns whether
/// `done` succeeded. A limit too large for `Instant` never expires.
fn poll_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(limit);
    loop {
        if done() {
            return true;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                EXIT_POLL_INTERVAL.min(deadline - now)
            }
            None => EXIT_POLL_INTERVAL,
        };
        thread::sleep(slice);
    }
}

fn reap_in_background(mut child: Child) {
    let pid = child.id();
    let spawned = thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || {
            let _ = child.wait();
        });
    if let Err(err) = spawned {
        warn!(pid, error = %err, "could not start reaper thread");
    }
}

/// The leader is gone but anything it forked still shares its process
/// group. Terminate the rest of the group the same way as a live player.
#[cfg(unix)]
fn stop_orphaned_group(pgid: u32, grace: Duration) {
    let pgid = pgid as libc::pid_t;
    if !group_alive(pgid) {
        return;
    }

    debug!(pgid, "terminating leftover player processes");
    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }
    if poll_until(grace, || !group_alive(pgid)) {
        return;
    }

    warn!(pgid, "leftover player processes ignored termination, killing");
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn stop_orphaned_group(_pgid: u32, _grace: Duration) {}

/// Zombies still count as members until their new parent reaps them.
#[cfg(unix)]
fn group_alive(pgid: libc::pid_t) -> bool {
    unsafe { libc::kill(-pgid, 0) == 0 }
}

#[cfg(unix)]
fn signal_group(child: &Child, signum: libc::c_int) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        if libc::kill(-pid, signum) != 0 {
            let _ = libc::kill(pid, signum);
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    signal_group(child, libc::SIGTERM);
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn kill(child: &mut Child) {
    signal_group(child, libc::SIGKILL);
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill(child: &mut Child) {
    let _ = child.kill();
}
