//! Device handle: command exchanges, the port-handle lifecycle, and the
//! owned view of tracking state.

use crate::bx::{self, BxFrame};
use crate::crc;
use crate::protocol::{self, PhsrStage, ReplyKind};
use crate::transport::{SerialTransport, Transport, DEFAULT_BAUD};
use crate::types::{
    FrameSample, HandleState, HandleStatus, SystemStatus, ToolInfo, TrackingPriority, Validity,
    BAD_FLOAT, MAX_SENSORS, NO_HANDLES,
};
use crate::TrackerError;
use std::time::Duration;

/// A position-tracking device on the other end of a [`Transport`].
///
/// The device hands out one handle per sensor port; each handle walks
/// the free, initialized, enabled lifecycle before it shows up in
/// tracking replies. `Device` owns a table with one slot per possible
/// handle id and keeps it current as replies arrive.
pub struct Device<T: Transport> {
    transport: T,
    handles: [HandleState; NO_HANDLES],
    system_status: SystemStatus,
    frame: u32,
    enabled: usize,
    timeout: Duration,
}

impl Device<SerialTransport> {
    /// Open a serial port and bring the device to a command-ready
    /// state: hardware reset, optional line-rate switch, then INIT.
    pub fn connect(path: &str, baud: u32) -> crate::Result<Self> {
        let transport = SerialTransport::open(path)?;
        let mut device = Device::new(transport);
        device.hardware_reset()?;
        if baud != DEFAULT_BAUD {
            device.set_comm_params(baud, false)?;
        }
        device.initialize()?;
        Ok(device)
    }
}

impl<T: Transport> Device<T> {
    /// Wrap an already-open transport. No commands are sent.
    pub fn new(transport: T) -> Self {
        Device {
            transport,
            handles: std::array::from_fn(|_| HandleState::default()),
            system_status: SystemStatus::empty(),
            frame: 0,
            enabled: 0,
            timeout: protocol::DEFAULT_TIMEOUT,
        }
    }

    // ---- command exchange ----

    fn send_command(&mut self, command: &str, add_crc: bool) -> crate::Result<()> {
        let framed = protocol::build_command(command, add_crc)?;
        self.timeout = protocol::timeout_for(command);
        log::trace!("sending {:?}", framed);
        self.transport.write(framed.as_bytes(), self.timeout)
    }

    fn receive_line(&mut self) -> crate::Result<String> {
        self.finish_line(None)
    }

    /// Read up to the terminator, prepending a byte the caller already
    /// consumed. Bytes that are not UTF-8 survive as replacement
    /// characters, which classification then rejects.
    fn finish_line(&mut self, first: Option<u8>) -> crate::Result<String> {
        let mut raw = Vec::new();
        raw.extend(first);
        loop {
            let byte = self.transport.read_byte(self.timeout)?;
            if byte == protocol::CARRIAGE_RETURN {
                break;
            }
            raw.push(byte);
            if raw.len() > protocol::MAX_REPLY_LEN {
                return Err(TrackerError::Protocol(format!(
                    "reply exceeds {} bytes without a terminator",
                    protocol::MAX_REPLY_LEN
                )));
            }
        }
        let line = String::from_utf8_lossy(&raw).into_owned();
        log::trace!("received {:?}", line);
        Ok(line)
    }

    /// Read one binary reply. The device answers a rejected BX with a
    /// plain ASCII line instead, so a non-preamble first byte reroutes
    /// to the line reader.
    fn receive_binary(&mut self) -> crate::Result<Vec<u8>> {
        let first = self.transport.read_byte(self.timeout)?;
        if first != protocol::BX_PREAMBLE[0] {
            let line = self.finish_line(Some(first))?;
            return Err(self.ascii_rejection(&line));
        }
        let mut raw = vec![first];
        while raw.len() < 4 {
            raw.push(self.transport.read_byte(self.timeout)?);
        }
        let payload_len = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        let total = bx::HEADER_LEN + payload_len + 2;
        if total > protocol::MAX_REPLY_LEN {
            return Err(TrackerError::Protocol(format!(
                "binary reply declares {} payload bytes",
                payload_len
            )));
        }
        while raw.len() < total {
            raw.push(self.transport.read_byte(self.timeout)?);
        }
        Ok(raw)
    }

    /// Send a command whose reply is a bare acknowledgement.
    fn command(&mut self, text: &str) -> crate::Result<()> {
        self.send_command(text, true)?;
        let reply = self.receive_line()?;
        match protocol::classify(&reply, false) {
            ReplyKind::Okay | ReplyKind::Reset => Ok(()),
            ReplyKind::Warning => {
                log::warn!("device warned in response to {:?}: {}", text, reply);
                Ok(())
            }
            ReplyKind::Error => Err(TrackerError::Device(protocol::describe_error(&reply))),
            ReplyKind::BadCrc => Err(self.ascii_integrity(&reply)),
            ReplyKind::Other | ReplyKind::Invalid => Err(TrackerError::Protocol(format!(
                "unexpected reply {:?} to {:?}",
                reply, text
            ))),
        }
    }

    /// Send a command whose reply carries data. The verified CRC
    /// trailer is stripped before the body is returned.
    fn query(&mut self, text: &str) -> crate::Result<String> {
        self.send_command(text, true)?;
        let reply = self.receive_line()?;
        match protocol::classify(&reply, true) {
            ReplyKind::Other => match crc::split_ascii(&reply) {
                Some((body, _)) => Ok(body.to_string()),
                None => Err(TrackerError::Protocol(format!(
                    "reply {:?} lacks a CRC trailer",
                    reply
                ))),
            },
            ReplyKind::Error => Err(TrackerError::Device(protocol::describe_error(&reply))),
            ReplyKind::BadCrc => Err(self.ascii_integrity(&reply)),
            kind => Err(TrackerError::Protocol(format!(
                "unexpected {:?} reply to {:?}",
                kind, text
            ))),
        }
    }

    fn ascii_integrity(&self, reply: &str) -> TrackerError {
        match crc::split_ascii(reply) {
            Some((body, expected)) => TrackerError::Integrity {
                expected,
                computed: crc::crc16(body.as_bytes()),
            },
            None => TrackerError::Protocol(format!("reply {:?} lacks a CRC trailer", reply)),
        }
    }

    fn ascii_rejection(&self, line: &str) -> TrackerError {
        match protocol::classify(line, false) {
            ReplyKind::Error => TrackerError::Device(protocol::describe_error(line)),
            ReplyKind::BadCrc => self.ascii_integrity(line),
            _ => TrackerError::Protocol(format!("expected binary reply, got {:?}", line)),
        }
    }

    // ---- bring-up ----

    /// Initialize the device's command interpreter. Must follow a reset
    /// before any port handles can be worked with.
    pub fn initialize(&mut self) -> crate::Result<()> {
        self.command("INIT ")
    }

    /// Hard-reset via a serial break. The host line falls back to the
    /// reset defaults first so the reset banner is readable.
    pub fn hardware_reset(&mut self) -> crate::Result<()> {
        self.transport.set_flow_control(false)?;
        self.transport.set_baud(DEFAULT_BAUD)?;
        self.transport.send_break()?;
        std::thread::sleep(protocol::RESET_SETTLE);
        self.timeout = protocol::timeout_for("RESET");
        let banner = self.receive_line()?;
        match protocol::classify(&banner, false) {
            ReplyKind::Reset if crc::verify_ascii(&banner) => {
                self.reset_state();
                Ok(())
            }
            ReplyKind::Reset => Err(self.ascii_integrity(&banner)),
            ReplyKind::Error => Err(TrackerError::Device(protocol::describe_error(&banner))),
            _ => Err(TrackerError::Protocol(format!(
                "expected reset banner, got {:?}",
                banner
            ))),
        }
    }

    /// Soft-reset through the command channel. Line settings survive.
    pub fn soft_reset(&mut self) -> crate::Result<()> {
        self.command("RESET 0")?;
        self.reset_state();
        std::thread::sleep(protocol::RESET_SETTLE);
        Ok(())
    }

    fn reset_state(&mut self) {
        self.handles = std::array::from_fn(|_| HandleState::default());
        self.system_status = SystemStatus::empty();
        self.frame = 0;
        self.enabled = 0;
    }

    /// Switch the device and then the host to a new line rate. 8N1
    /// framing is kept; `handshaking` selects hardware flow control.
    pub fn set_comm_params(&mut self, baud: u32, handshaking: bool) -> crate::Result<()> {
        let code = protocol::baud_code(baud)?;
        self.command(&format!("COMM {}000{}", code, handshaking as u8))?;
        self.transport.set_baud(baud)?;
        self.transport.set_flow_control(handshaking)?;
        std::thread::sleep(protocol::COMM_SETTLE);
        log::debug!("line rate switched to {} baud", baud);
        Ok(())
    }

    // ---- handle lifecycle ----

    /// Handle ids currently sitting at the given lifecycle stage.
    pub fn port_handles(&mut self, stage: PhsrStage) -> crate::Result<Vec<u8>> {
        let reply = self.query(&format!("PHSR {:02X}", stage.code()))?;
        protocol::parse_phsr_reply(&reply, stage)
    }

    /// Release a handle and clear its table slot.
    pub fn free_port(&mut self, handle: u8) -> crate::Result<()> {
        self.command(&format!("PHF {:02X}", handle))?;
        *self.state_mut(handle)? = HandleState::default();
        Ok(())
    }

    /// Run the port's self test and bring the handle to initialized.
    pub fn init_port(&mut self, handle: u8) -> crate::Result<()> {
        self.command(&format!("PINIT {:02X}", handle))?;
        self.state_mut(handle)?.status |= HandleStatus::INITIALIZED;
        Ok(())
    }

    /// Enable an initialized handle for tracking.
    pub fn enable_port(&mut self, handle: u8, priority: TrackingPriority) -> crate::Result<()> {
        self.command(&format!("PENA {:02X}{}", handle, priority.code()))?;
        self.state_mut(handle)?.status |= HandleStatus::ENABLED;
        self.refresh_tool_info(handle)
    }

    /// Walk every handle through the lifecycle: free stale handles,
    /// initialize occupied ports until none are pending, then enable
    /// the lot at the default priority. Each pending handle's info is
    /// fetched before init so handles the device already considers
    /// initialized are not re-initialized. Initializing one channel of
    /// a dual-sensor port surfaces the second as a new handle, hence
    /// the re-query loop. Returns the number of enabled sensors.
    pub fn activate_ports(&mut self) -> crate::Result<usize> {
        for handle in self.port_handles(PhsrStage::Free)? {
            self.free_port(handle)?;
        }
        let mut passes = 0;
        loop {
            let pending = self.port_handles(PhsrStage::Init)?;
            if pending.is_empty() {
                break;
            }
            passes += 1;
            if passes > protocol::MAX_INIT_PASSES {
                return Err(TrackerError::Lifecycle(format!(
                    "handles still awaiting init after {} passes",
                    protocol::MAX_INIT_PASSES
                )));
            }
            for handle in pending {
                self.refresh_tool_info(handle)?;
                let initialized = self
                    .handle_state(handle)
                    .is_some_and(|state| state.status.contains(HandleStatus::INITIALIZED));
                if !initialized {
                    self.init_port(handle)?;
                }
            }
        }
        for handle in self.port_handles(PhsrStage::Enable)? {
            self.enable_port(handle, TrackingPriority::default())?;
        }
        self.enabled = self.enabled_handles().count();
        log::info!("activated {} sensor(s)", self.enabled);
        Ok(self.enabled)
    }

    /// Fetch and return a handle's tool information.
    pub fn tool_info(&mut self, handle: u8) -> crate::Result<ToolInfo> {
        self.refresh_tool_info(handle)?;
        Ok(self.state_mut(handle)?.info.clone())
    }

    fn refresh_tool_info(&mut self, handle: u8) -> crate::Result<()> {
        let reply = self.query(&format!(
            "PHINF {:02X}{:04X}",
            handle,
            protocol::PHINF_BASIC_INFO
        ))?;
        let parsed = protocol::parse_phinf_reply(&reply)?;
        self.apply_tool_info(handle, parsed)
    }

    fn apply_tool_info(
        &mut self,
        handle: u8,
        parsed: protocol::ToolInfoReply,
    ) -> crate::Result<()> {
        let mut port = parsed.port;
        if parsed.second_channel {
            // Second sensor on a splitter: suffix both channels so the
            // labels stay distinct.
            for state in self.handles.iter_mut() {
                if state.port == port {
                    state.port = format!("{}-a", port);
                }
            }
            port.push_str("-b");
        }
        let state = self.state_mut(handle)?;
        state.info = parsed.info;
        state.port = port;
        state.status = (state.status - HandleStatus::PORT_FIELD) | parsed.status;
        Ok(())
    }

    // ---- tracking ----

    /// Start streaming mode. BX polls are only valid after this.
    pub fn start_tracking(&mut self) -> crate::Result<()> {
        self.command("TSTART ")
    }

    /// Leave streaming mode.
    pub fn stop_tracking(&mut self) -> crate::Result<()> {
        self.command("TSTOP ")
    }

    /// Poll one binary frame and fold it into the handle table.
    pub fn transforms(&mut self, include_out_of_volume: bool) -> crate::Result<BxFrame> {
        let mode = if include_out_of_volume {
            protocol::BX_MODE_OUT_OF_VOLUME
        } else {
            protocol::BX_MODE_DEFAULT
        };
        self.send_command(&format!("BX {:04X}", mode), true)?;
        let raw = self.receive_binary()?;
        let frame = bx::decode(&raw)?;
        self.apply_frame(&frame);
        Ok(frame)
    }

    fn apply_frame(&mut self, frame: &BxFrame) {
        for reported in &frame.handles {
            if let Some(state) = self.handles.get_mut(reported.handle as usize) {
                state.transform = reported.transform;
                // A disabled entry carries no status word, so the
                // lifecycle bits already in the table stand.
                if reported.transform.validity != Validity::Disabled {
                    state.status = reported.status;
                }
            }
        }
        self.system_status = frame.system_status;
        self.frame = frame.frame;
    }

    /// Snapshot the enabled sensors as one fixed-width sample.
    pub fn sample(&self) -> FrameSample {
        let mut sample = FrameSample {
            frame: self.frame,
            positions: [[BAD_FLOAT; 3]; MAX_SENSORS],
            valid: [false; MAX_SENSORS],
        };
        for (slot, (_, state)) in self.enabled_handles().take(MAX_SENSORS).enumerate() {
            sample.positions[slot] = state.transform.translation;
            sample.valid[slot] = state.transform.validity == Validity::Valid;
        }
        sample
    }

    /// Enabled handles in id order, with their table state.
    pub fn enabled_handles(&self) -> impl Iterator<Item = (u8, &HandleState)> {
        self.handles
            .iter()
            .enumerate()
            .filter(|(_, state)| state.status.contains(HandleStatus::ENABLED))
            .map(|(id, state)| (id as u8, state))
    }

    /// Table state for one handle id, if the id is in range.
    pub fn handle_state(&self, handle: u8) -> Option<&HandleState> {
        self.handles.get(handle as usize)
    }

    fn state_mut(&mut self, handle: u8) -> crate::Result<&mut HandleState> {
        self.handles
            .get_mut(handle as usize)
            .ok_or_else(|| TrackerError::Protocol(format!("handle id {:02X} is reserved", handle)))
    }

    /// True when any enabled sensor reports the broken-sensor bit.
    pub fn any_sensor_broken(&self) -> bool {
        self.enabled_handles()
            .any(|(_, state)| state.status.contains(HandleStatus::BROKEN_SENSOR))
    }

    /// Status word from the most recent tracking reply.
    pub fn system_status(&self) -> SystemStatus {
        self.system_status
    }

    /// Frame number from the most recent tracking reply.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Sensors enabled by the last [`Device::activate_ports`] run.
    pub fn enabled_count(&self) -> usize {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        bx_frame, bx_missing_block, bx_valid_block, phinf_text, ScriptedTransport,
    };

    fn device() -> Device<ScriptedTransport> {
        Device::new(ScriptedTransport::new())
    }

    #[test]
    fn test_initialize_accepts_okay() {
        let mut device = device();
        device.transport.push_reply("OKAY");
        device.initialize().unwrap();
        assert!(device.transport.commands()[0].starts_with("INIT:"));
    }

    #[test]
    fn test_warning_reply_is_success() {
        let mut device = device();
        device.transport.push_reply("WARNING");
        device.initialize().unwrap();
    }

    #[test]
    fn test_error_reply_carries_code() {
        let mut device = device();
        device.transport.push_reply("ERROR2B");
        let err = device.initialize().unwrap_err();
        match err {
            TrackerError::Device(message) => assert!(message.contains("2B")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_okay_surfaces_integrity() {
        let mut device = device();
        device.transport.push_line("OKAYFFFF");
        match device.initialize().unwrap_err() {
            TrackerError::Integrity { expected, computed } => {
                assert_eq!(expected, 0xFFFF);
                assert_eq!(computed, crate::crc::crc16(b"OKAY"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_hardware_reset_reads_banner_at_default_baud() {
        let mut device = device();
        device.transport.push_reply("RESET");
        device.frame = 77;
        device.hardware_reset().unwrap();
        assert_eq!(device.transport.breaks, 1);
        assert_eq!(device.transport.bauds, vec![DEFAULT_BAUD]);
        assert_eq!(device.transport.flow, vec![false]);
        assert_eq!(device.frame(), 0);
    }

    #[test]
    fn test_hardware_reset_rejects_garbled_banner() {
        let mut device = device();
        device.transport.push_line("RESET0000");
        assert!(matches!(
            device.hardware_reset(),
            Err(TrackerError::Integrity { .. })
        ));
    }

    #[test]
    fn test_comm_switch_applies_host_side() {
        let mut device = device();
        device.transport.push_reply("OKAY");
        device.set_comm_params(115_200, true).unwrap();
        assert!(device.transport.commands()[0].starts_with("COMM:50001"));
        assert_eq!(device.transport.bauds, vec![115_200]);
        assert_eq!(device.transport.flow, vec![true]);
    }

    #[test]
    fn test_comm_rejects_unsupported_baud() {
        let mut device = device();
        assert!(device.set_comm_params(300, false).is_err());
        assert!(device.transport.written.is_empty());
    }

    #[test]
    fn test_activation_single_sensor() {
        let mut device = device();
        let transport = &mut device.transport;
        transport.push_reply("00"); // nothing to free
        transport.push_reply("010A001"); // one handle pending init
        transport.push_reply(&phinf_text("01", "01", "00")); // info precedes init
        transport.push_reply("OKAY"); // PINIT
        transport.push_reply("00"); // init stage drained
        transport.push_reply("010A001"); // one handle to enable
        transport.push_reply("OKAY"); // PENA
        transport.push_reply(&phinf_text("31", "01", "00"));

        assert_eq!(device.activate_ports().unwrap(), 1);
        assert_eq!(device.enabled_count(), 1);

        let state = device.handle_state(0x0A).unwrap();
        assert!(state.status.contains(HandleStatus::ENABLED));
        assert_eq!(state.port, "01");
        assert_eq!(state.info.serial_number, "12345678");

        let commands = device.transport.commands();
        assert!(commands.iter().any(|c| c.starts_with("PINIT:0A")));
        assert!(commands.iter().any(|c| c.starts_with("PENA:0AD")));
        assert!(!commands.iter().any(|c| c.starts_with("PHF")));
    }

    #[test]
    fn test_activation_queries_init_stage_until_empty() {
        // The second channel of a dual-sensor port only appears after
        // the first channel's PINIT.
        let mut device = device();
        let transport = &mut device.transport;
        transport.push_reply("00");
        transport.push_reply("010A001");
        transport.push_reply(&phinf_text("01", "01", "00"));
        transport.push_reply("OKAY");
        transport.push_reply("010B001");
        transport.push_reply(&phinf_text("01", "01", "01"));
        transport.push_reply("OKAY");
        transport.push_reply("00");
        transport.push_reply("020A0010B001");
        transport.push_reply("OKAY");
        transport.push_reply(&phinf_text("31", "01", "00"));
        transport.push_reply("OKAY");
        transport.push_reply(&phinf_text("31", "01", "01"));

        assert_eq!(device.activate_ports().unwrap(), 2);
        assert_eq!(device.handle_state(0x0A).unwrap().port, "01-a");
        assert_eq!(device.handle_state(0x0B).unwrap().port, "01-b");
    }

    #[test]
    fn test_activation_skips_init_when_device_reports_initialized() {
        let mut device = device();
        device.transport.push_reply("00");
        device.transport.push_reply("010A001");
        device.transport.push_reply(&phinf_text("11", "01", "00"));
        device.transport.push_reply("00");
        device.transport.push_reply("00");
        assert_eq!(device.activate_ports().unwrap(), 0);
        assert!(!device
            .transport
            .commands()
            .iter()
            .any(|c| c.starts_with("PINIT")));
        assert!(device
            .handle_state(0x0A)
            .unwrap()
            .status
            .contains(HandleStatus::INITIALIZED));
    }

    #[test]
    fn test_activation_with_no_pending_handles_queries_once() {
        let mut device = device();
        device.transport.push_reply("00");
        device.transport.push_reply("00");
        device.transport.push_reply("00");
        assert_eq!(device.activate_ports().unwrap(), 0);
        let commands = device.transport.commands();
        let phsr = commands.iter().filter(|c| c.starts_with("PHSR")).count();
        assert_eq!(phsr, 3);
        assert!(!commands.iter().any(|c| c.starts_with("PINIT")));
    }

    #[test]
    fn test_activation_frees_stale_handles() {
        let mut device = device();
        device.transport.push_reply("010B");
        device.transport.push_reply("OKAY"); // PHF
        device.transport.push_reply("00");
        device.transport.push_reply("00");
        assert_eq!(device.activate_ports().unwrap(), 0);
        assert!(device
            .transport
            .commands()
            .iter()
            .any(|c| c.starts_with("PHF:0B")));
    }

    #[test]
    fn test_activation_stops_on_device_error() {
        let mut device = device();
        device.transport.push_reply("00");
        device.transport.push_reply("010A001");
        device.transport.push_reply(&phinf_text("01", "01", "00"));
        device.transport.push_reply("ERROR2B"); // PINIT refused
        assert!(matches!(
            device.activate_ports(),
            Err(TrackerError::Device(_))
        ));
        assert!(!device
            .transport
            .commands()
            .iter()
            .any(|c| c.starts_with("PENA")));
    }

    #[test]
    fn test_free_port_clears_table_slot() {
        let mut device = device();
        device.handles[0x0B].port = "02".to_string();
        device.handles[0x0B].status = HandleStatus::OCCUPIED | HandleStatus::INITIALIZED;
        device.transport.push_reply("OKAY");
        device.free_port(0x0B).unwrap();
        let state = device.handle_state(0x0B).unwrap();
        assert!(state.port.is_empty());
        assert_eq!(state.status, HandleStatus::empty());
    }

    #[test]
    fn test_transforms_updates_handle_table() {
        let mut device = device();
        device.handles[0x0A].status =
            HandleStatus::OCCUPIED | HandleStatus::INITIALIZED | HandleStatus::ENABLED;
        device.transport.push_reply("OKAY"); // TSTART
        device.transport.push_bytes(&bx_frame(
            &[bx_valid_block(
                0x0A,
                [1.0, 0.0, 0.0, 0.0],
                [10.0, 20.0, 30.0],
                0.4,
                0x0031,
                128,
            )],
            0x0000,
        ));

        device.start_tracking().unwrap();
        let frame = device.transforms(false).unwrap();
        assert_eq!(frame.frame, 128);
        assert_eq!(device.frame(), 128);

        let state = device.handle_state(0x0A).unwrap();
        assert_eq!(state.transform.translation, [10.0, 20.0, 30.0]);
        assert_eq!(state.transform.validity, Validity::Valid);

        let sample = device.sample();
        assert_eq!(sample.frame, 128);
        assert_eq!(sample.positions[0], [10.0, 20.0, 30.0]);
        assert!(sample.valid[0]);
        assert!(!sample.valid[1]);
        assert_eq!(sample.positions[1], [BAD_FLOAT; 3]);
    }

    #[test]
    fn test_transforms_marks_missing_sensor() {
        let mut device = device();
        device.handles[0x0A].status = HandleStatus::ENABLED;
        device
            .transport
            .push_bytes(&bx_frame(&[bx_missing_block(0x0A, 0x0131, 9)], 0));
        device.transforms(false).unwrap();
        let state = device.handle_state(0x0A).unwrap();
        assert_eq!(state.transform.validity, Validity::Missing);
        assert!(state.status.contains(HandleStatus::BROKEN_SENSOR));
        assert!(device.any_sensor_broken());
        assert!(!device.sample().valid[0]);
    }

    #[test]
    fn test_transforms_rejected_with_ascii_error() {
        let mut device = device();
        device.transport.push_reply("ERROR0C");
        assert!(matches!(
            device.transforms(true),
            Err(TrackerError::Device(_))
        ));
        assert!(device.transport.commands()[0].starts_with("BX:0801"));
    }

    #[test]
    fn test_receive_binary_length_bound() {
        let mut device = device();
        device.transport.push_bytes(&[0xC4, 0xA5, 0xFF, 0xFF]);
        assert!(matches!(
            device.transforms(false),
            Err(TrackerError::Protocol(_))
        ));
    }

    #[test]
    fn test_stop_tracking_sends_tstop() {
        let mut device = device();
        device.transport.push_reply("OKAY");
        device.stop_tracking().unwrap();
        assert!(device.transport.commands()[0].starts_with("TSTOP:"));
    }

    #[test]
    fn test_soft_reset_clears_state() {
        let mut device = device();
        device.frame = 12;
        device.handles[1].status = HandleStatus::ENABLED;
        device.transport.push_reply("RESET");
        device.soft_reset().unwrap();
        assert_eq!(device.frame(), 0);
        assert_eq!(device.enabled_handles().count(), 0);
    }
}
