//! Server-level acquisition client (not addressed to a specific device) for
//! electrochemical experiments — `spec.md` §4.8.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use xct_protocol::{
    record_channel_mask_to_list, retype_value, XCTCommands, XCTPacket, XCTPacketType, XctPort, XCTRecordChannel, XCTVChannel, XctValue,
};

use crate::buffer::AcqDataBuffer;
use crate::error::XctDeviceError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const START_READ_DELAY: Duration = Duration::from_secs(1);

/// Known gain settings that the acquisition firmware accepts as a fixed list index
/// rather than a raw value (`spec.md` §4.8, `startEIS2`'s `v_range`/`i_range`).
const GAIN_STEPS: [f64; 3] = [0.1, 1.0, 10.0];

fn resolve_gain_step(value: f64) -> i64 {
    match GAIN_STEPS.iter().position(|&g| (g - value).abs() < 1e-9) {
        Some(index) => index as i64,
        None => value as i64,
    }
}

struct AcqState {
    channels: Vec<&'static str>,
    channel_count: usize,
    next_read_index: usize,
}

/// A client driving server-level acquisition commands (`startEIS2`/`startCV`/`startCA`/
/// `startTimeScan`), polling the results back with `ReadBuffer` on a background task.
pub struct XctAcquisitionClient {
    bus: Arc<Mutex<dyn XctPort>>,
    buffer: Arc<AcqDataBuffer>,
    state: Arc<std::sync::Mutex<AcqState>>,
    downloading: Arc<AtomicBool>,
    reading: Arc<AtomicBool>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl XctAcquisitionClient {
    pub fn new(bus: Arc<Mutex<dyn XctPort>>) -> Self {
        Self {
            bus,
            buffer: Arc::new(AcqDataBuffer::new()),
            state: Arc::new(std::sync::Mutex::new(AcqState { channels: Vec::new(), channel_count: 0, next_read_index: 0 })),
            downloading: Arc::new(AtomicBool::new(false)),
            reading: Arc::new(AtomicBool::new(false)),
            reader_task: Mutex::new(None),
        }
    }

    async fn server_request(&self, cmd: XCTCommands, data: impl Into<String>) -> Result<XCTPacket, XctDeviceError> {
        let pkt = XCTPacket::new(XCTPacketType::Server, "", cmd, data);
        let mut bus = self.bus.lock().await;
        let ret = bus.request_response(pkt, None).await?;
        if ret.cmd != XCTCommands::Ok {
            return Err(XctDeviceError::Remote(ret.data));
        }
        Ok(ret)
    }

    /// `ECHO` against the server (distinct from a device's `CMD_ECHO`/`GET FWStatus`).
    pub async fn ping(&self) -> bool {
        self.server_request(XCTCommands::Echo, "").await.is_ok()
    }

    pub async fn get_msg(&self, parameter: &str) -> Result<XctValue, XctDeviceError> {
        let ret = self.server_request(XCTCommands::Get, parameter).await?;
        Ok(retype_value(&ret.data))
    }

    pub async fn set_msg(&self, parameter: &str, value: &str) -> Result<(), XctDeviceError> {
        self.server_request(XCTCommands::Set, format!("{parameter} {value}")).await?;
        Ok(())
    }

    async fn plain_cmd(&self, data: String) -> Result<(), XctDeviceError> {
        self.server_request(XCTCommands::PlainCmd, data).await?;
        Ok(())
    }

    async fn begin_acquisition(&self, channels: Vec<&'static str>, start_read: bool) {
        self.clear_read_buffer().await;
        {
            let mut state = self.state.lock().unwrap();
            state.channel_count = channels.len();
            state.channels = channels;
        }
        if start_read {
            self.start_read_data();
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_eis(
        &self,
        start_frequency: f64,
        stop_frequency: f64,
        points_per_decade: u32,
        max_amp_voltage: f64,
        max_amp_current: f64,
        v_range: f64,
        i_range: f64,
        periods: u32,
        samples: u32,
        v_channel: u8,
        start_read: bool,
    ) -> Result<(), XctDeviceError> {
        let v_range = resolve_gain_step(v_range);
        let i_range = resolve_gain_step(i_range);
        let cmd = format!(
            "startEIS2 {start_frequency} {stop_frequency} {points_per_decade} {max_amp_voltage} \
             {max_amp_current} {v_range} {i_range} {periods} {samples} {v_channel}"
        );
        self.plain_cmd(cmd).await?;
        const EIS_RECORD_CHANNELS: [&str; 9] = ["Z", "Phi", "Re", "Im", "genFreq", "sampleRate", "ampV", "ampI", "ampGen"];
        self.begin_acquisition(EIS_RECORD_CHANNELS.to_vec(), start_read).await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_cv(
        &self,
        voltage_channel: XCTVChannel,
        record_channels: XCTRecordChannel,
        voltage_start: f64,
        voltage_margin1: f64,
        voltage_margin2: f64,
        voltage_end: f64,
        speed: f64,
        sweep: f64,
        start_read: bool,
    ) -> Result<(), XctDeviceError> {
        if record_channels.is_empty() {
            return Err(XctDeviceError::NoRecordChannel);
        }
        let cmd = format!(
            "startCV {} {} {voltage_start} {voltage_margin1} {voltage_margin2} {voltage_end} {speed} {sweep}",
            voltage_channel as u8,
            record_channels.bits()
        );
        self.plain_cmd(cmd).await?;
        self.begin_acquisition(record_channel_mask_to_list(record_channels), start_read).await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_ca(
        &self,
        voltage_channel: XCTVChannel,
        record_channels: XCTRecordChannel,
        current_start: f64,
        current_margin1: f64,
        current_margin2: f64,
        current_end: f64,
        speed: f64,
        sweep: f64,
        start_read: bool,
    ) -> Result<(), XctDeviceError> {
        if record_channels.is_empty() {
            return Err(XctDeviceError::NoRecordChannel);
        }
        let cmd = format!(
            "startCA {} {} {current_start} {current_margin1} {current_margin2} {current_end} {speed} {sweep}",
            voltage_channel as u8,
            record_channels.bits()
        );
        self.plain_cmd(cmd).await?;
        self.begin_acquisition(record_channel_mask_to_list(record_channels), start_read).await;
        Ok(())
    }

    pub async fn start_time_scan(
        &self,
        record_channels: XCTRecordChannel,
        every_n_sample: u32,
        avg_last_m: u32,
        start_read: bool,
    ) -> Result<(), XctDeviceError> {
        if record_channels.is_empty() {
            return Err(XctDeviceError::NoRecordChannel);
        }
        let cmd = format!("startTimeScan {} {every_n_sample} {avg_last_m}", record_channels.bits());
        self.plain_cmd(cmd).await?;
        self.begin_acquisition(record_channel_mask_to_list(record_channels), start_read).await;
        Ok(())
    }

    pub async fn stop_acq(&self) -> Result<(), XctDeviceError> {
        self.plain_cmd("stopAcq".to_string()).await
    }

    pub async fn check_downloading(&self) -> Result<bool, XctDeviceError> {
        let value = self.get_msg("downloading").await?;
        let downloading = matches!(value, XctValue::Bool(true)) || matches!(value, XctValue::Int(n) if n != 0);
        self.downloading.store(downloading, Ordering::SeqCst);
        Ok(downloading)
    }

    /// `ReadBuffer <next_index>`: returns the number of rows newly buffered. `0` either
    /// means the firmware isn't ready yet (`True`/`False` placeholder reply, in which case
    /// this sleeps a second before returning, mirroring the polling loop's own backoff) or
    /// that the channel count of the reply didn't match what the acquisition was started
    /// with, which aborts the acquisition outright.
    pub async fn read_buffer_cmd(&self) -> Result<usize, XctDeviceError> {
        let next_index = self.state.lock().unwrap().next_read_index;
        let ret = self.server_request(XCTCommands::PlainCmd, format!("ReadBuffer {next_index}")).await?;

        if ret.data == "True" || ret.data == "False" {
            tokio::time::sleep(START_READ_DELAY).await;
            return Ok(0);
        }

        let (count_token, rest) = ret.data.trim().split_once(' ').ok_or(XctDeviceError::MalformedStructure)?;
        let channel_count: usize = count_token.parse().map_err(|_| XctDeviceError::MalformedStructure)?;
        let expected = self.state.lock().unwrap().channel_count;
        if expected != channel_count {
            self.stop_acq().await.ok();
            self.clear_read_buffer().await;
            return Err(XctDeviceError::ChannelCountMismatch { expected, actual: channel_count });
        }

        let values: Vec<XctValue> = rest.split_whitespace().map(retype_value).collect();
        let rows: Vec<Vec<XctValue>> = values.chunks(channel_count.max(1)).map(|chunk| chunk.to_vec()).collect();
        let added = rows.len();
        self.buffer.add_data(rows);
        self.state.lock().unwrap().next_read_index += added;
        Ok(added)
    }

    fn start_read_data(&self) {
        self.reading.store(true, Ordering::SeqCst);
        let bus = self.bus.clone();
        let buffer = self.buffer.clone();
        let state = self.state.clone();
        let downloading = self.downloading.clone();
        let reading = self.reading.clone();
        let client = XctAcquisitionClient { bus, buffer, state, downloading, reading: reading.clone(), reader_task: Mutex::new(None) };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(START_READ_DELAY).await;
            loop {
                let still_downloading = match client.check_downloading().await {
                    Ok(d) => d,
                    Err(e) => {
                        error!(error = %e, "acquisition poll failed while checking downloading status");
                        break;
                    }
                };
                match client.read_buffer_cmd().await {
                    Ok(_) => {}
                    Err(e) => {
                        let message = e.to_string();
                        if !still_downloading && message.contains("ERROR 44") {
                            break;
                        } else if message.contains("ERROR 44") {
                            tokio::time::sleep(TRANSIENT_ERROR_BACKOFF).await;
                            continue;
                        } else {
                            warn!(error = %e, "acquisition read loop aborted");
                            break;
                        }
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            reading.store(false, Ordering::SeqCst);
        });
        // Replacing any previous handle silently is fine: `clear_read_buffer` is always
        // called before a new acquisition starts, so at most one loop is ever live.
        if let Ok(mut guard) = self.reader_task.try_lock() {
            *guard = Some(handle);
        }
    }

    pub async fn clear_read_buffer(&self) {
        self.downloading.store(false, Ordering::SeqCst);
        self.reading.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            state.channels.clear();
            state.channel_count = 0;
            state.next_read_index = 0;
        }
        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.buffer.clear_data();
    }

    /// Drains everything currently buffered, labelled with the channel names the running
    /// acquisition was started with.
    pub fn read_buffer(&self) -> AcqBufferSnapshot {
        if !self.buffer.has_data() {
            return AcqBufferSnapshot::Empty;
        }
        let channels = self.state.lock().unwrap().channels.clone();
        AcqBufferSnapshot::Data { channels, rows: self.buffer.drain_all() }
    }

    pub fn read_buffer_done(&self) -> bool {
        !self.reading.load(Ordering::SeqCst) && !self.buffer.has_data()
    }

    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcqBufferSnapshot {
    Empty,
    Data { channels: Vec<&'static str>, rows: Vec<Vec<XctValue>> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct FakeXctPort {
        replies: StdMutex<VecDeque<XCTPacket>>,
        sent: StdMutex<Vec<XCTPacket>>,
    }

    #[async_trait::async_trait]
    impl XctPort for FakeXctPort {
        async fn connect(&mut self) -> Result<(), xct_protocol::XctError> {
            Ok(())
        }

        async fn request_response(&mut self, pkt: XCTPacket, _timeout: Option<Duration>) -> Result<XCTPacket, xct_protocol::XctError> {
            self.sent.lock().unwrap().push(pkt);
            self.replies.lock().unwrap().pop_front().ok_or(xct_protocol::XctError::ConnectionClosed)
        }

        fn bus_name(&self) -> String {
            "fake-xct-server".into()
        }
    }

    fn ok(data: impl Into<String>) -> XCTPacket {
        XCTPacket::new(XCTPacketType::Answer, "", XCTCommands::Ok, data)
    }

    fn client_with(replies: Vec<XCTPacket>) -> XctAcquisitionClient {
        let bus: Arc<Mutex<dyn XctPort>> = Arc::new(Mutex::new(FakeXctPort { replies: StdMutex::new(replies.into()), sent: StdMutex::new(Vec::new()) }));
        XctAcquisitionClient::new(bus)
    }

    #[test]
    fn known_gain_values_resolve_to_their_list_index() {
        assert_eq!(resolve_gain_step(0.1), 0);
        assert_eq!(resolve_gain_step(1.0), 1);
        assert_eq!(resolve_gain_step(10.0), 2);
        assert_eq!(resolve_gain_step(2.0), 2);
    }

    #[tokio::test]
    async fn start_cv_rejects_an_empty_record_channel_mask() {
        let client = client_with(vec![]);
        let err = client.start_cv(XCTVChannel::Vout, XCTRecordChannel::empty(), 0.0, 0.0, 0.0, 1.0, 0.1, 1.0, false).await.unwrap_err();
        assert!(matches!(err, XctDeviceError::NoRecordChannel));
    }

    #[tokio::test]
    async fn start_ca_without_auto_read_sets_up_channel_bookkeeping() {
        let client = client_with(vec![ok("")]);
        client
            .start_ca(XCTVChannel::Vsense, XCTRecordChannel::VOUT | XCTRecordChannel::I, 0.0, 0.0, 0.0, 1.0, 0.1, 1.0, false)
            .await
            .unwrap();
        assert_eq!(client.state.lock().unwrap().channel_count, 2);
        assert!(!client.is_reading());
    }

    #[tokio::test]
    async fn read_buffer_cmd_chunks_flat_values_by_channel_count() {
        let client = client_with(vec![ok("2 1 2 3 4")]);
        {
            let mut state = client.state.lock().unwrap();
            state.channel_count = 2;
        }
        let added = client.read_buffer_cmd().await.unwrap();
        assert_eq!(added, 2);
        match client.read_buffer() {
            AcqBufferSnapshot::Data { rows, .. } => {
                assert_eq!(rows, vec![vec![XctValue::Int(1), XctValue::Int(2)], vec![XctValue::Int(3), XctValue::Int(4)]]);
            }
            AcqBufferSnapshot::Empty => panic!("expected data"),
        }
    }

    #[tokio::test]
    async fn read_buffer_cmd_rejects_a_channel_count_mismatch() {
        let client = client_with(vec![ok("3 1 2 3")]);
        {
            let mut state = client.state.lock().unwrap();
            state.channel_count = 2;
        }
        let err = client.read_buffer_cmd().await.unwrap_err();
        assert!(matches!(err, XctDeviceError::ChannelCountMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn read_buffer_done_is_true_once_idle_and_drained() {
        let client = client_with(vec![]);
        assert!(client.read_buffer_done());
    }
}
