//! Network interface counters.
//!
//! While a run is in progress a background thread reads `/proc/net/dev` once per
//! period and appends an `Interfaces` event to `interface_stats.log`. It stops
//! when its cancellation token fires.

use crate::cancel::CancellationToken;
use crate::events::{to_line, ExperimentEvent, InterfaceCounters};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const NET_DEV: &str = "/proc/net/dev";

/// Parse the content of `/proc/net/dev`.
///
/// Lines that do not carry a full set of counters are skipped.
pub fn parse_net_dev(content: &str) -> BTreeMap<String, InterfaceCounters> {
    let mut stats = BTreeMap::new();
    for line in content.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = match counters.split_whitespace().map(str::parse).collect() {
            Ok(fields) => fields,
            Err(_) => continue,
        };
        if fields.len() < 16 {
            continue;
        }
        // Receive: bytes packets errs drop fifo frame compressed multicast
        // Transmit: bytes packets errs drop fifo colls carrier compressed
        stats.insert(
            name.trim().to_string(),
            InterfaceCounters {
                bytes_recv: fields[0],
                packets_recv: fields[1],
                errin: fields[2],
                dropin: fields[3],
                bytes_sent: fields[8],
                packets_sent: fields[9],
                errout: fields[10],
                dropout: fields[11],
            },
        );
    }
    stats
}

pub fn read_interface_counters() -> io::Result<BTreeMap<String, InterfaceCounters>> {
    Ok(parse_net_dev(&fs::read_to_string(NET_DEV)?))
}

/// Handle to the running sampler thread
pub struct InterfaceSampler {
    handle: JoinHandle<usize>,
    cancel: CancellationToken,
}

impl InterfaceSampler {
    /// Start sampling into `<log_dir>/interface_stats.log`
    pub fn spawn(log_dir: &Path, period: Duration) -> io::Result<Self> {
        let file = File::create(log_dir.join("interface_stats.log"))?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("interface-stats".to_string())
            .spawn(move || sample_loop(BufWriter::new(file), period, &token, read_interface_counters))?;
        Ok(Self { handle, cancel })
    }

    /// Stop the thread and wait for it. Returns the number of samples written.
    pub fn stop(self) -> usize {
        self.cancel.cancel();
        match self.handle.join() {
            Ok(samples) => samples,
            Err(_) => {
                log::error!("Interface statistics thread panicked");
                0
            }
        }
    }
}

fn sample_loop<W, F>(mut out: W, period: Duration, cancel: &CancellationToken, read: F) -> usize
where
    W: Write,
    F: Fn() -> io::Result<BTreeMap<String, InterfaceCounters>>,
{
    let mut samples = 0;
    while !cancel.is_cancelled() {
        match read() {
            Ok(stats) => {
                let written = to_line(&ExperimentEvent::Interfaces { stats })
                    .map_err(io::Error::from)
                    .and_then(|line| writeln!(out, "{}", line))
                    .and_then(|_| out.flush());
                match written {
                    Ok(()) => samples += 1,
                    Err(e) => log::warn!("Could not write interface statistics: {}", e),
                }
            }
            Err(e) => log::warn!("Could not read interface statistics: {}", e),
        }
        if cancel.sleep(period) {
            break;
        }
    }
    log::debug!("Interface statistics stopped after {} samples", samples);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::SharedBuffer;

    const SAMPLE: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     789    0    0    0     0          0         0   123456     789    0    0    0     0       0          0
es-s0:  1000 10 1 2 0 0 0 0 2000 20 3 4 0 0 0 0
  eth0: broken line
";

    #[test]
    fn test_parse_net_dev() {
        let stats = parse_net_dev(SAMPLE);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["lo"].bytes_recv, 123456);
        assert_eq!(stats["lo"].packets_sent, 789);
        assert_eq!(
            stats["es-s0"],
            InterfaceCounters {
                bytes_sent: 2000,
                bytes_recv: 1000,
                packets_sent: 20,
                packets_recv: 10,
                errin: 1,
                errout: 3,
                dropin: 2,
                dropout: 4,
            }
        );
    }

    #[test]
    fn test_loop_writes_until_cancelled() {
        let buffer = SharedBuffer::default();
        let token = CancellationToken::new();
        let writer_token = token.clone();
        let out = buffer.clone();
        let handle = thread::spawn(move || {
            sample_loop(out, Duration::from_millis(20), &writer_token, || Ok(parse_net_dev(SAMPLE)))
        });
        thread::sleep(Duration::from_millis(150));
        token.cancel();
        let samples = handle.join().unwrap();

        let records = buffer.records();
        assert!(samples >= 2);
        assert_eq!(records.len(), samples);
        assert_eq!(records[0]["type"], "Interfaces");
        assert_eq!(records[0]["stats"]["es-s0"]["dropout"], 4);
    }

    #[test]
    fn test_spawn_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = InterfaceSampler::spawn(dir.path(), Duration::from_secs(60)).unwrap();
        thread::sleep(Duration::from_millis(100));
        // The first sample is taken immediately, the stop interrupts the wait
        let samples = sampler.stop();
        let content = fs::read_to_string(dir.path().join("interface_stats.log")).unwrap();
        assert_eq!(content.lines().count(), samples);
    }
}
