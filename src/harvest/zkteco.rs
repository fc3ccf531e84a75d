use crate::harvest::driver::{CaptureDriver, CaptureSession, HarvestError, RawPunch};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

// Vendor terminal protocol, TCP transport. Only the subset the gateway needs:
// plain connect (no comm-key session), attendance log transfer, disconnect.
const HEADER_MAGIC: [u8; 4] = [0x50, 0x50, 0x82, 0x7d];

const CMD_CONNECT: u16 = 1000;
const CMD_EXIT: u16 = 1001;
const CMD_ATTLOG_RRQ: u16 = 13;
const CMD_PREPARE_DATA: u16 = 1500;
const CMD_DATA: u16 = 1501;
const CMD_FREE_DATA: u16 = 1502;
const CMD_ACK_OK: u16 = 2000;
const CMD_ACK_UNAUTH: u16 = 2005;

const RECORD_LEN: usize = 40;

pub struct ZkTecoDriver {
    timeout: Duration,
}

impl ZkTecoDriver {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ZkTecoDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDriver for ZkTecoDriver {
    fn connect(&self, address: &str) -> Result<Box<dyn CaptureSession>, HarvestError> {
        let addr = address
            .to_socket_addrs()
            .map_err(|err| HarvestError::Unreachable(format!("{address}: {err}")))?
            .next()
            .ok_or_else(|| HarvestError::Unreachable(format!("{address}: no address")))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|err| HarvestError::Unreachable(format!("{address}: {err}")))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut session = ZkTecoSession {
            stream,
            session_id: 0,
            reply_id: 0,
        };
        session.handshake()?;
        Ok(Box::new(session))
    }
}

struct Packet {
    cmd: u16,
    session_id: u16,
    data: Vec<u8>,
}

struct ZkTecoSession {
    stream: TcpStream,
    session_id: u16,
    reply_id: u16,
}

impl ZkTecoSession {
    fn handshake(&mut self) -> Result<(), HarvestError> {
        let reply = self.command(CMD_CONNECT, &[])?;
        match reply.cmd {
            CMD_ACK_OK => {
                self.session_id = reply.session_id;
                Ok(())
            }
            CMD_ACK_UNAUTH => Err(HarvestError::Protocol(
                "terminal requires a comm key; unset it on the device".to_string(),
            )),
            other => Err(HarvestError::Protocol(format!(
                "connect rejected with reply command {other}"
            ))),
        }
    }

    fn command(&mut self, cmd: u16, data: &[u8]) -> Result<Packet, HarvestError> {
        self.send(cmd, data)?;
        self.read_packet()
    }

    fn send(&mut self, cmd: u16, data: &[u8]) -> Result<(), HarvestError> {
        self.reply_id = self.reply_id.wrapping_add(1);
        let mut payload = Vec::with_capacity(8 + data.len());
        payload.extend_from_slice(&cmd.to_le_bytes());
        payload.extend_from_slice(&[0, 0]); // checksum patched below
        payload.extend_from_slice(&self.session_id.to_le_bytes());
        payload.extend_from_slice(&self.reply_id.to_le_bytes());
        payload.extend_from_slice(data);
        let checksum = checksum(&payload);
        payload[2..4].copy_from_slice(&checksum.to_le_bytes());

        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&HEADER_MAGIC);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        self.stream.write_all(&frame)?;
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Packet, HarvestError> {
        let mut header = [0u8; 8];
        self.stream.read_exact(&mut header)?;
        if header[0..4] != HEADER_MAGIC {
            return Err(HarvestError::Protocol(
                "bad frame magic from terminal".to_string(),
            ));
        }
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if len < 8 {
            return Err(HarvestError::Protocol(format!("short frame ({len} bytes)")));
        }
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        Ok(Packet {
            cmd: u16::from_le_bytes([payload[0], payload[1]]),
            session_id: u16::from_le_bytes([payload[4], payload[5]]),
            data: payload[8..].to_vec(),
        })
    }
}

impl CaptureSession for ZkTecoSession {
    fn read_events(&mut self) -> Result<Vec<RawPunch>, HarvestError> {
        let reply = self.command(CMD_ATTLOG_RRQ, &[])?;
        let data = match reply.cmd {
            CMD_ACK_OK => reply.data,
            CMD_PREPARE_DATA => {
                if reply.data.len() < 4 {
                    return Err(HarvestError::Protocol(
                        "prepare-data reply without a size".to_string(),
                    ));
                }
                let total = u32::from_le_bytes([
                    reply.data[0],
                    reply.data[1],
                    reply.data[2],
                    reply.data[3],
                ]) as usize;
                let mut buf = Vec::with_capacity(total);
                while buf.len() < total {
                    let chunk = self.read_packet()?;
                    match chunk.cmd {
                        CMD_DATA => buf.extend_from_slice(&chunk.data),
                        CMD_ACK_OK => break,
                        other => {
                            return Err(HarvestError::Protocol(format!(
                                "unexpected reply command {other} during attendance transfer"
                            )));
                        }
                    }
                }
                let _ = self.command(CMD_FREE_DATA, &[]);
                buf
            }
            other => {
                return Err(HarvestError::Protocol(format!(
                    "attendance request rejected with reply command {other}"
                )));
            }
        };
        parse_attendance(&data)
    }

    fn close(&mut self) {
        let _ = self.send(CMD_EXIT, &[]);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn checksum(payload: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = payload.chunks_exact(2);
    for pair in &mut chunks {
        sum += u16::from_le_bytes([pair[0], pair[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += *last as u32;
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn parse_attendance(data: &[u8]) -> Result<Vec<RawPunch>, HarvestError> {
    let mut records = data;
    // Some firmware prefixes the record block with its own length.
    if records.len() >= 4 {
        let prefix = u32::from_le_bytes([records[0], records[1], records[2], records[3]]) as usize;
        if prefix == records.len() - 4 {
            records = &records[4..];
        }
    }
    if records.len() % RECORD_LEN != 0 {
        return Err(HarvestError::Protocol(format!(
            "unsupported attendance record layout ({} bytes)",
            records.len()
        )));
    }

    let mut punches = Vec::with_capacity(records.len() / RECORD_LEN);
    for record in records.chunks_exact(RECORD_LEN) {
        let uid = u16::from_le_bytes([record[0], record[1]]);
        let subject_id = {
            let raw = &record[2..26];
            let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
            let id = String::from_utf8_lossy(&raw[..end]).trim().to_string();
            if id.is_empty() { uid.to_string() } else { id }
        };
        let encoded = u32::from_le_bytes([record[27], record[28], record[29], record[30]]);
        let occurred_at = decode_time(encoded).ok_or_else(|| {
            HarvestError::Protocol(format!("unrepresentable timestamp {encoded}"))
        })?;
        punches.push(RawPunch {
            subject_id,
            occurred_at,
            event_type: record[31] as i64,
        });
    }
    Ok(punches)
}

// Terminal clocks encode wall time as a packed count since 2000-01-01 with
// fixed 31-day months; decode must mirror that exactly, not act as a real
// calendar conversion.
fn decode_time(mut encoded: u32) -> Option<NaiveDateTime> {
    let second = encoded % 60;
    encoded /= 60;
    let minute = encoded % 60;
    encoded /= 60;
    let hour = encoded % 24;
    encoded /= 24;
    let day = encoded % 31 + 1;
    encoded /= 31;
    let month = encoded % 12 + 1;
    encoded /= 12;
    let year = 2000 + encoded as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
