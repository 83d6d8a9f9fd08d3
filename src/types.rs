/// Exclusive upper bound on handle ids; the id 0xFF itself never names a
/// real handle.
pub const NO_HANDLES: usize = 0xFF;

/// Sensor slots carried per polled frame.
pub const MAX_SENSORS: usize = 4;

/// Sentinel the device documents for "no measurement". Transform fields
/// hold it whenever the validity flag is not [`Validity::Valid`].
pub const BAD_FLOAT: f32 = -3.697314e28;

/// Validity of one handle's transform for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// The transform was measured this frame.
    Valid,
    /// The sensor is enabled but was not seen this frame.
    Missing,
    /// Transform reporting is disabled for this handle.
    Disabled,
}

/// One frame's pose and quality metrics for a handle.
///
/// Orientation and translation are meaningful only while `validity` is
/// [`Validity::Valid`]; otherwise every numeric field holds
/// [`BAD_FLOAT`]. Check the flag, not the numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Orientation as a unit quaternion [q0, qx, qy, qz].
    pub rotation: [f32; 4],
    /// Translation in millimeters [x, y, z].
    pub translation: [f32; 3],
    /// RMS fit error in millimeters.
    pub error: f32,
    /// Frame number the measurement belongs to.
    pub frame: u32,
    pub validity: Validity,
}

impl Transform {
    /// A transform with every numeric field set to the bad-value sentinel.
    pub(crate) fn invalid(validity: Validity, frame: u32) -> Self {
        Transform {
            rotation: [BAD_FLOAT; 4],
            translation: [BAD_FLOAT; 3],
            error: BAD_FLOAT,
            frame,
            validity,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::invalid(Validity::Missing, 0)
    }
}

bitflags::bitflags! {
    /// Per-handle status word carried in BX frames; PHINF replies carry
    /// the low six bits of it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleStatus: u32 {
        const OCCUPIED             = 0x0001;
        const GPIO_1               = 0x0002;
        const GPIO_2               = 0x0004;
        const GPIO_3               = 0x0008;
        const INITIALIZED          = 0x0010;
        const ENABLED              = 0x0020;
        const OUT_OF_VOLUME        = 0x0040;
        const PARTLY_OUT_OF_VOLUME = 0x0080;
        const BROKEN_SENSOR        = 0x0100;
        const DISTURBANCE          = 0x0200;
        const SIGNAL_TOO_SMALL     = 0x0400;
        const SIGNAL_TOO_BIG       = 0x0800;
        const PROCESSING_EXCEPTION = 0x1000;
        const HARDWARE_FAILURE     = 0x2000;
    }
}

impl HandleStatus {
    /// Bits a PHINF per-port status field can carry.
    pub const PORT_FIELD: HandleStatus = HandleStatus::OCCUPIED
        .union(HandleStatus::GPIO_1)
        .union(HandleStatus::GPIO_2)
        .union(HandleStatus::GPIO_3)
        .union(HandleStatus::INITIALIZED)
        .union(HandleStatus::ENABLED);
}

impl Default for HandleStatus {
    fn default() -> Self {
        HandleStatus::empty()
    }
}

bitflags::bitflags! {
    /// Link-level conditions refreshed on every BX frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SystemStatus: u16 {
        const COMM_SYNC_ERROR       = 0x0001;
        const INTERFERENCE          = 0x0002;
        const SYSTEM_CRC_ERROR      = 0x0004;
        const RECOVERABLE_EXCEPTION = 0x0008;
        const HARDWARE_FAILURE      = 0x0010;
        const HARDWARE_CHANGE       = 0x0020;
        const PORT_OCCUPIED         = 0x0040;
        const PORT_UNOCCUPIED       = 0x0080;
    }
}

/// Identity fields reported by the device for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInfo {
    pub tool_type: String,
    pub manufacturer: String,
    pub revision: String,
    pub serial_number: String,
    pub part_number: String,
}

/// Live state for one device-assigned handle.
#[derive(Debug, Clone, Default)]
pub struct HandleState {
    pub info: ToolInfo,
    /// Physical-port label like "01", or "01-a"/"01-b" when two sensors
    /// share a port. Empty while the handle is free.
    pub port: String,
    pub status: HandleStatus,
    pub transform: Transform,
}

/// Tracking priority requested when enabling a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingPriority {
    Static,
    #[default]
    Dynamic,
    ButtonBox,
}

impl TrackingPriority {
    /// Priority character as it appears in the PENA command.
    pub fn code(self) -> char {
        match self {
            TrackingPriority::Static => 'S',
            TrackingPriority::Dynamic => 'D',
            TrackingPriority::ButtonBox => 'B',
        }
    }
}

/// One polled sample: every sensor slot's position plus the frame number.
///
/// Slots map to enabled handles in id order; slots past the enabled
/// count, and slots whose sensor was not measured this frame, hold
/// [`BAD_FLOAT`] with `valid` cleared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub frame: u32,
    /// Position per sensor slot [x, y, z] in millimeters.
    pub positions: [[f32; 3]; MAX_SENSORS],
    /// Which slots carried a valid transform this frame.
    pub valid: [bool; MAX_SENSORS],
}
