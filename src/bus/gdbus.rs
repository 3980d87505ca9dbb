//! Session bus driven through the `gdbus` command line tool.
//!
//! - calls: `gdbus call --session --dest .. --object-path .. --method ..`
//! - registration: `gdbus wait --session <name>`
//! - signals: `gdbus monitor --session --dest .. --object-path ..`, one line per signal
//! - compositing: a one second `Properties.Get` on KWin's compositor object

use super::{MethodCall, SessionBus, SignalMatch, SignalMessage, SignalReceiver, names};
use crate::errors::BusError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// `gdbus`-backed [`SessionBus`].
#[derive(Debug, Clone)]
pub struct GdbusBus {
    program: String,
}

impl Default for GdbusBus {
    fn default() -> Self {
        Self::new("gdbus")
    }
}

impl GdbusBus {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn tool_failed(&self, source: std::io::Error) -> BusError {
        BusError::ToolFailed {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl SessionBus for GdbusBus {
    async fn call(&self, call: &MethodCall) -> Result<(), BusError> {
        let method = call.method();
        let mut cmd = self.command();
        cmd.args(["call", "--session", "--dest"])
            .arg(&call.service)
            .arg("--object-path")
            .arg(&call.path)
            .arg("--method")
            .arg(&method)
            .arg("--timeout")
            .arg(call.timeout.as_secs().max(1).to_string())
            .args(call.args.iter().map(|a| gvariant_string(a)));

        let output = cmd.output().await.map_err(|e| self.tool_failed(e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BusError::CallFailed {
                method,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn wait_for_service(&self, service: &str) -> Result<(), BusError> {
        let output = self
            .command()
            .args(["wait", "--session", service])
            .output()
            .await
            .map_err(|e| self.tool_failed(e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BusError::WaitFailed {
                service: service.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn subscribe(&self, signal: &SignalMatch) -> Result<SignalReceiver, BusError> {
        let mut child = self
            .command()
            .args(["monitor", "--session", "--dest"])
            .arg(&signal.service)
            .arg("--object-path")
            .arg(&signal.path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.tool_failed(e))?;
        let stdout = child.stdout.take().ok_or(BusError::Closed)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_signals(child, stdout, tx, signal.clone()));
        Ok(rx)
    }

    async fn compositing_active(&self) -> bool {
        let output = self
            .command()
            .args(["call", "--session", "--timeout", "1", "--dest"])
            .arg(names::WINDOW_MANAGER)
            .arg("--object-path")
            .arg(names::COMPOSITOR_PATH)
            .arg("--method")
            .arg("org.freedesktop.DBus.Properties.Get")
            .arg(names::COMPOSITING_INTERFACE)
            .arg("active")
            .stderr(Stdio::null())
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).contains("true")
            }
            Ok(_) => false,
            Err(e) => {
                debug!(error = %e, "Compositing check failed");
                false
            }
        }
    }
}

/// Forward parsed monitor lines to `tx` until the monitor exits or the
/// receiver is dropped. Dropping `child` on return kills the monitor.
async fn pump_signals(
    child: Child,
    stdout: ChildStdout,
    tx: mpsc::UnboundedSender<SignalMessage>,
    signal: SignalMatch,
) {
    let _child = child;
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = tokio::select! {
            _ = tx.closed() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let Some(message) = parse_monitor_line(&line, &signal) else {
                    continue;
                };
                if tx.send(message).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Reading gdbus monitor output failed");
                break;
            }
        }
    }
    debug!(signal = %signal.member, "Signal monitor stopped");
}

/// Quote a string as GVariant text so `gdbus` never reinterprets it.
fn gvariant_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Parse one `gdbus monitor` line such as
/// `/Compositor: org.kde.kwin.Compositing.compositingToggled (true,)`.
fn parse_monitor_line(line: &str, signal: &SignalMatch) -> Option<SignalMessage> {
    let (path, rest) = line.trim().split_once(": ")?;
    if path != signal.path {
        return None;
    }
    let (member, args) = match rest.split_once(' ') {
        Some((member, args)) => (member, args.trim()),
        None => (rest, ""),
    };
    let expected = format!("{}.{}", signal.interface, signal.member);
    if member != expected {
        return None;
    }
    let args = args
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|a| a.trim().trim_matches('\'').to_string())
        .filter(|a| !a.is_empty())
        .collect();
    Some(SignalMessage {
        member: signal.member.clone(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_compositing_toggled() {
        let signal = SignalMatch::compositing_toggled();
        let msg = parse_monitor_line(
            "/Compositor: org.kde.kwin.Compositing.compositingToggled (true,)",
            &signal,
        )
        .unwrap();
        assert_eq!(msg.member, "compositingToggled");
        assert_eq!(msg.args, vec!["true"]);
        assert_eq!(msg.first_bool(), Some(true));
    }

    #[test]
    fn test_parse_string_arguments() {
        let signal = SignalMatch::new("org.example", "/obj", "org.example.Iface", "changed");
        let msg =
            parse_monitor_line("/obj: org.example.Iface.changed ('a', 'b')", &signal).unwrap();
        assert_eq!(msg.args, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_ignores_other_signals() {
        let signal = SignalMatch::compositing_toggled();
        assert!(
            parse_monitor_line("/Compositor: org.kde.kwin.Compositing.other (true,)", &signal)
                .is_none()
        );
        assert!(
            parse_monitor_line(
                "/Other: org.kde.kwin.Compositing.compositingToggled (true,)",
                &signal
            )
            .is_none()
        );
        assert!(parse_monitor_line("The name org.kde.KWin is owned by :1.7", &signal).is_none());
    }

    #[test]
    fn test_gvariant_string_quotes() {
        assert_eq!(gvariant_string("ready"), "'ready'");
        assert_eq!(gvariant_string("it's"), "'it\\'s'");
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let bus = GdbusBus::new("/nonexistent/gdbus");
        let call = MethodCall::new(names::SPLASH, "/KSplash", "org.kde.KSplash", "setStage");
        let err = bus.call(&call).await.unwrap_err();
        assert!(matches!(err, BusError::ToolFailed { .. }));
        assert!(!bus.compositing_active().await);
        assert_eq!(bus.compositing_known(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_pump_stops_when_receiver_dropped() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        // The monitor prints nothing; only the dropped receiver can end the pump.
        let pump = pump_signals(child, stdout, tx, SignalMatch::compositing_toggled());
        assert!(
            tokio::time::timeout(Duration::from_secs(5), pump)
                .await
                .is_ok()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_pump_forwards_matching_lines() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("echo '/Compositor: org.kde.kwin.Compositing.compositingToggled (true,)'; sleep 30")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_signals(
            child,
            stdout,
            tx,
            SignalMatch::compositing_toggled(),
        ));

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.first_bool(), Some(true));

        drop(rx);
        assert!(
            tokio::time::timeout(Duration::from_secs(5), pump)
                .await
                .is_ok()
        );
    }
}
