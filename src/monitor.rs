// src/monitor.rs
//! Input sources that drive a pipeline

use crate::{
    config::PipelineConfig,
    error::{NmeaError, Result},
    pipeline::{Event, Pipeline, PipelineStats},
};
use log::{debug, error, info};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    net::UdpSocket,
    time::timeout,
};

const UDP_BUFFER_SIZE: usize = 4096;

/// Where raw NMEA lines come from
#[derive(Debug, Clone)]
pub enum NmeaSource {
    File(PathBuf),
    Stdin,
    Udp { host: String, port: u16 },
}

/// Feeds one source into its own pipeline and hands every event to a callback
pub struct NmeaMonitor {
    pipeline: Pipeline,
    running: Arc<AtomicBool>,
}

impl NmeaMonitor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Self {
            pipeline: Pipeline::new(config)?,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Shared flag; storing `false` stops `run` at the next line or timeout.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &PipelineStats {
        self.pipeline.stats()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Read the source until it ends or the monitor is stopped.
    ///
    /// Any open block is flushed before returning.
    pub async fn run<F>(&mut self, source: NmeaSource, mut on_event: F) -> Result<()>
    where
        F: FnMut(&Event),
    {
        match source {
            NmeaSource::File(path) => {
                info!("Reading NMEA from {}", path.display());
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    NmeaError::Connection(format!("Failed to open {}: {}", path.display(), e))
                })?;
                self.read_lines(BufReader::new(file), &mut on_event).await?;
            }
            NmeaSource::Stdin => {
                info!("Reading NMEA from stdin");
                self.read_lines(BufReader::new(tokio::io::stdin()), &mut on_event)
                    .await?;
            }
            NmeaSource::Udp { host, port } => {
                let socket = UdpSocket::bind((host.as_str(), port)).await.map_err(|e| {
                    NmeaError::Connection(format!("Failed to bind UDP {}:{}: {}", host, port, e))
                })?;
                info!("Listening for NMEA on udp://{}:{}", host, port);
                self.read_datagrams(socket, &mut on_event).await?;
            }
        }

        emit(self.pipeline.flush(), &mut on_event);
        info!("Source finished: {:?}", self.pipeline.stats());
        Ok(())
    }

    /// Feed newline-terminated lines until EOF.
    ///
    /// Bytes are decoded lossily so a garbled line becomes a decode error
    /// instead of ending the read. A partial line survives idle timeouts.
    async fn read_lines<R, F>(&mut self, mut reader: R, on_event: &mut F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: FnMut(&Event),
    {
        let idle = self.idle_wait();
        let mut buffer = Vec::new();

        while self.is_running() {
            match timeout(idle, reader.read_until(b'\n', &mut buffer)).await {
                Err(_) => emit(self.pipeline.tick_at(Instant::now()), on_event),
                Ok(Ok(0)) => {
                    // EOF; a final line may lack its newline
                    if !buffer.is_empty() {
                        let line = String::from_utf8_lossy(&buffer).into_owned();
                        self.feed(&line, on_event);
                    }
                    break;
                }
                Ok(Ok(_)) => {
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    buffer.clear();
                    self.feed(&line, on_event);
                }
                Ok(Err(e)) => {
                    error!("Error reading NMEA input: {}", e);
                    return Err(NmeaError::Io(e));
                }
            }
        }
        Ok(())
    }

    async fn read_datagrams<F>(&mut self, socket: UdpSocket, on_event: &mut F) -> Result<()>
    where
        F: FnMut(&Event),
    {
        let idle = self.idle_wait();
        let mut buffer = vec![0u8; UDP_BUFFER_SIZE];

        while self.is_running() {
            match timeout(idle, socket.recv_from(&mut buffer)).await {
                Err(_) => emit(self.pipeline.tick_at(Instant::now()), on_event),
                Ok(Ok((len, peer))) => {
                    let payload = String::from_utf8_lossy(&buffer[..len]);
                    debug!("{} bytes from {}", len, peer);
                    for line in payload.lines() {
                        self.feed(line, on_event);
                    }
                }
                Ok(Err(e)) => {
                    error!("Error receiving UDP datagram: {}", e);
                    return Err(NmeaError::Io(e));
                }
            }
        }
        Ok(())
    }

    fn feed<F: FnMut(&Event)>(&mut self, line: &str, on_event: &mut F) {
        let line = line.trim();
        if !line.is_empty() {
            emit(self.pipeline.feed(line), on_event);
        }
    }

    /// Poll slightly past the idle timeout so a stale block is due on wake-up.
    fn idle_wait(&self) -> Duration {
        self.pipeline.config().idle_timeout() + Duration::from_millis(10)
    }
}

fn emit<F: FnMut(&Event)>(events: Vec<Event>, on_event: &mut F) {
    for event in &events {
        on_event(event);
    }
}
