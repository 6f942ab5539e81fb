use super::commands::{EngineMessage, GuiCommand};
use super::decoder::Decoder;
use super::encoder::Encoder;
use log::debug;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const QUIT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// A running engine process spoken to over UCI.
///
/// Output lines are decoded on a dedicated reader thread and handed to the
/// callback given at spawn time, in the order the engine printed them.
/// `on_exit` runs once on that thread when the engine's output closes.
pub struct EngineConnection {
    pid: u32,
    /// `None` once closed.
    child: Option<Child>,
    stdin: BufWriter<ChildStdin>,
    encoder: Encoder,
}

impl EngineConnection {
    pub fn spawn<F, X>(
        path: &Path,
        args: &[String],
        mut on_message: F,
        on_exit: X,
    ) -> io::Result<Self>
    where
        F: FnMut(EngineMessage) + Send + 'static,
        X: FnOnce() + Send + 'static,
    {
        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout unavailable"))?;

        let pid = child.id();
        thread::spawn(move || {
            let decoder = Decoder::new();
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("[{}] < {}", pid, line);
                on_message(decoder.decode(line));
            }
            debug!("[{}] output closed", pid);
            on_exit();
        });

        Ok(Self {
            pid,
            child: Some(child),
            stdin: BufWriter::new(stdin),
            encoder: Encoder {},
        })
    }

    pub fn id(&self) -> u32 {
        self.pid
    }

    pub fn send(&mut self, command: &GuiCommand) -> io::Result<()> {
        let line = self.encoder.encode(command);
        debug!("[{}] > {}", self.pid, line);

        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()
    }

    /// Asks the engine to quit without waiting for it.
    ///
    /// An engine still running after `quit` is killed by a background reaper
    /// once the grace period has passed.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if self.send(&GuiCommand::Quit).is_err() {
            // Pipe is gone, the process is dead or dying.
            let _ = child.kill();
        } else if child.try_wait()?.is_some() {
            return Ok(());
        }

        let pid = self.pid;
        thread::spawn(move || reap(pid, child));
        Ok(())
    }
}

fn reap(pid: u32, mut child: Child) {
    let deadline = Instant::now() + QUIT_GRACE_PERIOD;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }

    debug!("[{}] did not quit, killing", pid);
    let _ = child.kill();
    let _ = child.wait();
}

impl Drop for EngineConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
