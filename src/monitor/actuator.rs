//! Firewall mitigation.
//!
//! The platform strategy is picked once at startup. Each hardware address is
//! blocked at most once per process: the actuator remembers what it has
//! already applied and does not touch the firewall again for it.

use crate::monitor::error::ActuationError;
use dashmap::DashSet;
use pnet::util::MacAddr;
use std::process::Command;

/// A single firewall invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallCommand {
    pub program: String,
    pub args:    Vec<String>,
}

/// How a block rule is expressed on the running platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStrategy {
    /// iptables rule dropping inbound frames by source MAC.
    PacketFilter,
    /// Windows Defender Firewall rule keyed on the remote MAC.
    HostFirewall,
    /// Detection keeps running, blocking reports an error.
    Unsupported { platform: String },
}

impl BlockStrategy {
    /// Picks the strategy for the target OS this binary was built for.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => BlockStrategy::PacketFilter,
            "windows" => BlockStrategy::HostFirewall,
            other => BlockStrategy::Unsupported { platform: other.to_string() },
        }
    }

    /// The command that installs a block rule for `mac`.
    pub fn command(&self, mac: MacAddr) -> Result<FirewallCommand, ActuationError> {
        let mac = mac.to_string();
        let (program, args) = match self {
            BlockStrategy::PacketFilter => (
                "iptables",
                vec![
                    "-A".to_string(),
                    "INPUT".to_string(),
                    "-m".to_string(),
                    "mac".to_string(),
                    "--mac-source".to_string(),
                    mac,
                    "-j".to_string(),
                    "DROP".to_string(),
                ],
            ),
            BlockStrategy::HostFirewall => (
                "netsh",
                vec![
                    "advfirewall".to_string(),
                    "firewall".to_string(),
                    "add".to_string(),
                    "rule".to_string(),
                    format!("name=Block MAC {mac}"),
                    "dir=in".to_string(),
                    "action=block".to_string(),
                    "remoteip=any".to_string(),
                    format!("remoteMAC={mac}"),
                ],
            ),
            BlockStrategy::Unsupported { platform } => {
                return Err(ActuationError::UnsupportedPlatform(platform.clone()));
            }
        };

        Ok(FirewallCommand { program: program.to_string(), args })
    }
}

/// Executes firewall commands.
pub trait CommandRunner {
    /// Runs `cmd` to completion. `Err` carries a human-readable reason.
    fn run(&self, cmd: &FirewallCommand) -> Result<(), String>;
}

/// Runs commands through the OS.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &FirewallCommand) -> Result<(), String> {
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .output()
            .map_err(|e| format!("cannot execute: {e}"))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Err(output.status.to_string())
        } else {
            Err(format!("{}: {}", output.status, stderr))
        }
    }
}

/// Result of a successful [`Actuator::block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// A rule was installed by this call.
    Applied,
    /// The address was blocked earlier; nothing was run.
    AlreadyBlocked,
}

/// Applies block rules idempotently.
pub struct Actuator<C = SystemRunner> {
    strategy: BlockStrategy,
    runner:   C,
    blocked:  DashSet<MacAddr>,
}

impl Actuator<SystemRunner> {
    /// Actuator for the current platform running real commands.
    pub fn for_current_platform() -> Self {
        Self::new(BlockStrategy::detect(), SystemRunner)
    }
}

impl<C: CommandRunner> Actuator<C> {
    pub fn new(strategy: BlockStrategy, runner: C) -> Self {
        Self { strategy, runner, blocked: DashSet::new() }
    }

    pub fn strategy(&self) -> &BlockStrategy {
        &self.strategy
    }

    #[cfg(test)]
    pub fn runner(&self) -> &C {
        &self.runner
    }

    #[cfg(test)]
    pub fn is_blocked(&self, mac: &MacAddr) -> bool {
        self.blocked.contains(mac)
    }

    /// Blocks inbound traffic from `mac`.
    ///
    /// Failed attempts are not remembered, so a later detection retries.
    pub fn block(&self, mac: MacAddr) -> Result<BlockOutcome, ActuationError> {
        if self.blocked.contains(&mac) {
            return Ok(BlockOutcome::AlreadyBlocked);
        }

        let cmd = self.strategy.command(mac)?;
        self.runner
            .run(&cmd)
            .map_err(|detail| ActuationError::CommandFailed {
                program: cmd.program.clone(),
                detail,
            })?;

        self.blocked.insert(mac);
        Ok(BlockOutcome::Applied)
    }
}
