//! Scripted [`DeviceSession`] double shared by the integration suites.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use fleetprobe::session::{DeviceSession, SessionError};

pub const SHOW_VERSION: &str = "\
Cisco IOS Software, C2960X Software (C2960X-UNIVERSALK9-M), Version 15.2(2)E6, RELEASE SOFTWARE (fc1)
Copyright (c) 1986-2016 by Cisco Systems, Inc.

cisco WS-C2960X-24TS-L (APM86XXX) processor (revision B0) with 524288K bytes of memory.
";

pub const SHOW_CDP: &str = "\
Device ID        Local Intrfce     Holdtme    Capability  Platform  Port ID
core1            Gig 0/1           160              R S I  WS-C3650  Gig 1/0/1
edge2            Gig 0/2           133               S I   WS-C2960  Gig 0/24
";

pub const NTP_SYNCED: &str = "Clock is synchronized, stratum 2, reference is 10.0.0.1\n";
pub const NTP_UNSYNCED: &str = "Clock is unsynchronized, stratum 16, no reference clock\n";
pub const PING_OK: &str = "Success rate is 100 percent (5/5), round-trip min/avg/max = 1/2/4 ms";
pub const PING_DEAD: &str = "Success rate is 0 percent (0/5)";

/// A canned-reply session: `execute` answers from a command map, `configure`
/// and `close` record what happened for later assertions.
#[derive(Clone, Default)]
pub struct ScriptedSession {
    replies: HashMap<String, String>,
    failing: HashSet<String>,
    ping_reply: Option<String>,
    ping_fails: bool,
    configure_fails: bool,
    pub configured: Arc<Mutex<Vec<Vec<String>>>>,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, command: &str, reply: &str) -> Self {
        self.replies.insert(command.to_string(), reply.to_string());
        self
    }

    pub fn with_failing_command(mut self, command: &str) -> Self {
        self.failing.insert(command.to_string());
        self
    }

    pub fn with_ping_reply(mut self, reply: &str) -> Self {
        self.ping_reply = Some(reply.to_string());
        self
    }

    pub fn with_ping_failure(mut self) -> Self {
        self.ping_fails = true;
        self
    }

    #[allow(dead_code)]
    pub fn with_configure_failure(mut self) -> Self {
        self.configure_fails = true;
        self
    }

    pub fn configure_calls(&self) -> Vec<Vec<String>> {
        self.configured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DeviceSession for ScriptedSession {
    fn execute(
        &mut self,
        command: &str,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send {
        let result = if self.failing.contains(command) {
            Err(SessionError::Command(format!(
                "scripted failure for '{command}'"
            )))
        } else {
            self.replies.get(command).cloned().ok_or_else(|| {
                SessionError::Command(format!("no scripted reply for '{command}'"))
            })
        };
        async move { result }
    }

    fn configure(
        &mut self,
        commands: &[String],
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send {
        let result = if self.configure_fails {
            Err(SessionError::Command("scripted configure failure".to_string()))
        } else {
            self.configured
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(commands.to_vec());
            Ok(())
        };
        async move { result }
    }

    fn ping(
        &mut self,
        _target: &str,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send {
        let result = if self.ping_fails {
            Err(SessionError::Connection("scripted ping failure".to_string()))
        } else {
            self.ping_reply
                .clone()
                .ok_or_else(|| SessionError::Command("no scripted ping reply".to_string()))
        };
        async move { result }
    }

    fn close(&mut self) -> impl std::future::Future<Output = Result<(), SessionError>> + Send {
        self.closed.store(true, Ordering::SeqCst);
        async move { Ok(()) }
    }
}
