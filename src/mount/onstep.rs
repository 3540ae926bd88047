//! OnStep mount client speaking the LX200 command set over TCP.
//!
//! Every command uses its own short-lived connection, matching how OnStep's
//! WiFi bridge expects to be driven. Coordinates go out with the same
//! truncating sexagesimal format the LX200 server uses.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use super::MountLink;
use crate::common::constants::MOUNT_REPLY_BUFFER_SIZE;
use crate::common::utils::seconds;
use crate::config::MountConfig;
use crate::lx200::{format_dec, format_ra};
use crate::model::{Equatorial, SolveResult};

/// Bytes OnStep uses to draw the distance bar while a slew is in progress.
const SLEW_BAR_CHARS: [char; 2] = ['|', '\u{7f}'];

pub struct OnStepClient {
    address: String,
    timeout: Duration,
    slew_timeout: Duration,
    poll_interval: Duration,
}

impl OnStepClient {
    pub fn new(
        address: impl Into<String>,
        timeout: Duration,
        slew_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            timeout,
            slew_timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &MountConfig) -> Self {
        Self::new(
            config.address(),
            seconds(config.timeout),
            seconds(config.slew_timeout),
            seconds(config.poll_interval),
        )
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.address
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve mount address {}", self.address))?
            .next()
            .with_context(|| format!("Mount address {} resolved to nothing", self.address))
    }

    fn connect(&self) -> Result<TcpStream> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)
            .with_context(|| format!("Failed to connect to mount at {addr}"))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .context("Failed to set mount read timeout")?;
        stream
            .set_write_timeout(Some(self.timeout))
            .context("Failed to set mount write timeout")?;
        Ok(stream)
    }

    /// Send one command without waiting for a reply.
    fn send(&self, command: &str) -> Result<()> {
        log_debug!("Mount <- {command}");
        let mut stream = self.connect()?;
        stream
            .write_all(command.as_bytes())
            .with_context(|| format!("Failed to send {command} to mount"))
    }

    /// Send one command and read its `#`-terminated reply.
    fn query(&self, command: &str) -> Result<String> {
        log_debug!("Mount <- {command}");
        let mut stream = self.connect()?;
        stream
            .write_all(command.as_bytes())
            .with_context(|| format!("Failed to send {command} to mount"))?;

        let mut reply = Vec::new();
        let mut chunk = [0u8; MOUNT_REPLY_BUFFER_SIZE];
        while !reply.contains(&b'#') {
            let n = stream
                .read(&mut chunk)
                .with_context(|| format!("Failed to read mount reply to {command}"))?;
            if n == 0 {
                break;
            }
            reply.extend_from_slice(&chunk[..n]);
        }

        let reply = String::from_utf8_lossy(&reply).into_owned();
        log_debug!("Mount -> {reply:?}");
        Ok(reply)
    }

    fn set_target(&self, coords: Equatorial) -> Result<()> {
        self.send(&format!(":Sr{}#", format_ra(coords.ra_deg)))?;
        self.send(&format!(":Sd{}#", format_dec(coords.dec_deg)))
    }

    /// Poll the distance bar until the slew has finished.
    fn wait_for_slew(&self) -> Result<()> {
        let started = Instant::now();
        loop {
            let reply = self.query(":D#")?;
            if !reply.contains(SLEW_BAR_CHARS) {
                log_debug!("Slew finished after {:.1}s", started.elapsed().as_secs_f64());
                return Ok(());
            }
            if started.elapsed() >= self.slew_timeout {
                anyhow::bail!(
                    "Mount still slewing after {}s",
                    self.slew_timeout.as_secs_f64()
                );
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn coordinates(result: &SolveResult) -> Result<Equatorial> {
    result
        .coords
        .context("Cannot send a result without coordinates to the mount")
}

impl MountLink for OnStepClient {
    fn sync(&self, result: &SolveResult) -> Result<()> {
        let coords = coordinates(result)?;
        log_decorated!("Syncing mount to {coords}");
        self.set_target(coords)?;
        self.send(":CM#")?;
        log_indented!("Mount sync completed");
        Ok(())
    }

    fn slew_then_sync(&self, result: &SolveResult) -> Result<()> {
        let coords = coordinates(result)?;
        log_decorated!("Slewing mount to {coords}");
        self.set_target(coords)?;
        self.send(":MS#")?;
        self.wait_for_slew()?;
        self.send(":CM#")?;
        log_indented!("Mount slew and sync completed");
        Ok(())
    }
}
