use crate::collectors::{SourceError, SourceResult};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
}

impl CommandOutput {
    pub fn success_text(self, query: &str) -> SourceResult<String> {
        if !self.status.success() {
            return Err(SourceError::Malformed {
                query: query.to_string(),
                detail: format!("код завершения {}", self.status),
            });
        }
        Ok(decode_cmd_stdout(&self.stdout))
    }
}

/// Runs `command` and kills it once `timeout` elapses. Stdout is drained on a
/// helper thread so a chatty child cannot block on a full pipe.
pub fn run_with_timeout(
    query: &str,
    mut command: Command,
    timeout: Duration,
) -> SourceResult<CommandOutput> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| SourceError::Io {
            query: query.to_string(),
            source,
        })?;

    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            buf
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Timeout {
                    query: query.to_string(),
                    timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(source) => {
                let _ = child.kill();
                return Err(SourceError::Io {
                    query: query.to_string(),
                    source,
                });
            }
        }
    };

    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    Ok(CommandOutput { status, stdout })
}

/// Console tools on Windows may answer in UTF-16LE depending on the code page.
pub fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let u16buf: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s;
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

pub fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| {
            c.is_ascii_digit()
                || *c == '.'
                || *c == ','
                || *c == 'e'
                || *c == 'E'
                || *c == '-'
                || *c == '+'
        })
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

pub fn parse_u64_loose(input: &str) -> Option<u64> {
    parse_f64_loose(input).map(|v| if v < 0.0 { 0 } else { v as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_f64_loose_accepts_decimal_comma() {
        assert_eq!(parse_f64_loose("12,5"), Some(12.5));
        assert_eq!(parse_f64_loose(" 3010 "), Some(3010.0));
        assert_eq!(parse_f64_loose("45 %"), Some(45.0));
        assert_eq!(parse_f64_loose("n/a"), None);
    }

    #[test]
    fn parse_u64_loose_floors_negative() {
        assert_eq!(parse_u64_loose("-5"), Some(0));
        assert_eq!(parse_u64_loose("8192"), Some(8192));
    }

    #[test]
    fn decode_cmd_stdout_handles_utf16le() {
        let bytes: Vec<u8> = "ok\r\n"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        // BOM first: plain ASCII in UTF-16LE would still be valid UTF-8.
        let mut invalid_utf8 = vec![0xFF, 0xFE];
        invalid_utf8.extend_from_slice(&bytes);
        let decoded = decode_cmd_stdout(&invalid_utf8);
        assert!(decoded.ends_with("ok\r\n"));
    }

    #[test]
    fn missing_binary_is_io_error() {
        let err = run_with_timeout(
            "missing",
            Command::new("sysprobe-definitely-missing-binary"),
            Duration::from_millis(200),
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_with_timeout("sleep", cmd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn fast_command_returns_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let out = run_with_timeout("echo", cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(out.success_text("echo").unwrap().trim(), "hello");
    }
}
