//! NVMe Register and Command Definitions
//!
//! Register offsets and bitfields for the controller window, plus the
//! 64-byte submission and 16-byte completion queue entry layouts.

use tock_registers::register_bitfields;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// -- Controller register offsets

/// Controller Capabilities (CAP)
pub const REG_CAP: usize = 0x00;
/// Version (VS)
pub const REG_VS: usize = 0x08;
/// Interrupt Mask Set (INTMS)
pub const REG_INTMS: usize = 0x0C;
/// Interrupt Mask Clear (INTMC)
pub const REG_INTMC: usize = 0x10;
/// Controller Configuration (CC)
pub const REG_CC: usize = 0x14;
/// Controller Status (CSTS)
pub const REG_CSTS: usize = 0x1C;
/// Admin Queue Attributes (AQA)
pub const REG_AQA: usize = 0x24;
/// Admin Submission Queue Base Address (ASQ)
pub const REG_ASQ: usize = 0x28;
/// Admin Completion Queue Base Address (ACQ)
pub const REG_ACQ: usize = 0x30;

/// Doorbell registers start here; stride is `4 << CAP.DSTRD` bytes.
pub const DOORBELL_BASE: usize = 0x1000;

/// Interrupt mask covering every vector.
pub const INTM_ALL_VECTORS: u32 = 0xFFFF_FFFF;
/// Interrupt mask bit for vector 0 (the only vector this driver uses).
pub const INTM_VECTOR0: u32 = 1 << 0;

// -- Register bitfields

register_bitfields![u64,
    /// Controller Capabilities (64-bit)
    pub CAP [
        /// Maximum Queue Entries Supported (0-based)
        MQES OFFSET(0) NUMBITS(16) [],
        /// Contiguous Queues Required
        CQR OFFSET(16) NUMBITS(1) [],
        /// Timeout, in 500 ms units
        TO OFFSET(24) NUMBITS(8) [],
        /// Doorbell Stride (stride is 4 << DSTRD bytes)
        DSTRD OFFSET(32) NUMBITS(4) [],
        /// NVM Subsystem Reset Supported
        NSSRS OFFSET(36) NUMBITS(1) [],
        /// Memory Page Size Minimum (2^(12 + MPSMIN))
        MPSMIN OFFSET(48) NUMBITS(4) [],
        /// Memory Page Size Maximum (2^(12 + MPSMAX))
        MPSMAX OFFSET(52) NUMBITS(4) [],
    ]
];

register_bitfields![u32,
    /// Controller Configuration (32-bit)
    pub CC [
        /// Enable
        EN OFFSET(0) NUMBITS(1) [],
        /// I/O Command Set Selected
        CSS OFFSET(4) NUMBITS(3) [],
        /// Memory Page Size (2^(12 + MPS))
        MPS OFFSET(7) NUMBITS(4) [],
        /// Shutdown Notification
        SHN OFFSET(14) NUMBITS(2) [],
        /// I/O Submission Queue Entry Size (2^IOSQES bytes)
        IOSQES OFFSET(16) NUMBITS(4) [],
        /// I/O Completion Queue Entry Size (2^IOCQES bytes)
        IOCQES OFFSET(20) NUMBITS(4) [],
    ],

    /// Controller Status (32-bit)
    pub CSTS [
        /// Ready
        RDY OFFSET(0) NUMBITS(1) [],
        /// Controller Fatal Status
        CFS OFFSET(1) NUMBITS(1) [],
        /// Shutdown Status
        SHST OFFSET(2) NUMBITS(2) [],
    ],

    /// Admin Queue Attributes (32-bit)
    pub AQA [
        /// Admin Submission Queue Size (0-based)
        ASQS OFFSET(0) NUMBITS(12) [],
        /// Admin Completion Queue Size (0-based)
        ACQS OFFSET(16) NUMBITS(12) [],
    ],

    /// Version (32-bit)
    pub VS [
        /// Tertiary Version Number
        TER OFFSET(0) NUMBITS(8) [],
        /// Minor Version Number
        MNR OFFSET(8) NUMBITS(8) [],
        /// Major Version Number
        MJR OFFSET(16) NUMBITS(16) [],
    ]
];

/// `CC.IOSQES` value for 64-byte submission entries (2^6).
pub const CC_IOSQES_64B: u32 = 6;
/// `CC.IOCQES` value for 16-byte completion entries (2^4).
pub const CC_IOCQES_16B: u32 = 4;

// -- Command opcodes

/// Admin command opcodes
pub mod admin_opcode {
    /// Delete I/O Submission Queue
    pub const DELETE_IO_SQ: u8 = 0x00;
    /// Create I/O Submission Queue
    pub const CREATE_IO_SQ: u8 = 0x01;
    /// Delete I/O Completion Queue
    pub const DELETE_IO_CQ: u8 = 0x04;
    /// Create I/O Completion Queue
    pub const CREATE_IO_CQ: u8 = 0x05;
    /// Identify
    pub const IDENTIFY: u8 = 0x06;
}

/// NVM command opcodes (I/O commands)
pub mod nvm_opcode {
    /// Flush
    pub const FLUSH: u8 = 0x00;
    /// Write
    pub const WRITE: u8 = 0x01;
    /// Read
    pub const READ: u8 = 0x02;
}

/// Identify CNS values
pub mod identify_cns {
    /// Identify Namespace
    pub const NAMESPACE: u32 = 0x00;
    /// Identify Controller
    pub const CONTROLLER: u32 = 0x01;
}

// -- Submission queue entry (64 bytes)

/// NVMe command: one submission queue slot.
///
/// Must be zero-initialised before each use; `submit` fills only the
/// fields the command needs.
#[repr(C)]
#[derive(Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NvmeCommand {
    /// Opcode
    pub opc: u8,
    /// Fused operation flags / PSDT
    pub fuse: u8,
    /// Command Identifier
    pub cid: u16,
    /// Namespace Identifier
    pub nsid: u32,
    /// Reserved (CDW2/CDW3)
    pub reserved: u64,
    /// Metadata Pointer
    pub mptr: u64,
    /// Data Pointer 1 (PRP1)
    pub prp1: u64,
    /// Data Pointer 2 (PRP2)
    pub prp2: u64,
    /// Command Dword 10
    pub cdw10: u32,
    /// Command Dword 11
    pub cdw11: u32,
    /// Command Dword 12
    pub cdw12: u32,
    /// Command Dword 13
    pub cdw13: u32,
    /// Command Dword 14
    pub cdw14: u32,
    /// Command Dword 15
    pub cdw15: u32,
}

// -- Completion queue entry (16 bytes)

/// NVMe completion: one completion queue slot.
#[repr(C)]
#[derive(Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NvmeCompletion {
    /// Command-specific result (DW0)
    pub dw0: u32,
    /// Reserved (DW1)
    pub dw1: u32,
    /// SQ Head Pointer echoed by the controller
    pub sq_head: u16,
    /// SQ Identifier
    pub sqid: u16,
    /// Command Identifier
    pub cid: u16,
    /// Status field; phase bit at bit 0
    pub status: u16,
}

/// Phase bit position in the completion status word.
pub const CQE_STATUS_PHASE: u16 = 1 << 0;

impl NvmeCompletion {
    /// Phase bit.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> bool {
        (self.status & CQE_STATUS_PHASE) != 0
    }

    /// Status Code (SC, bits 1..8).
    #[inline]
    #[must_use]
    pub const fn status_code(&self) -> u8 {
        ((self.status >> 1) & 0xFF) as u8
    }

    /// Status Code Type (SCT, bits 9..11).
    #[inline]
    #[must_use]
    pub const fn status_code_type(&self) -> u8 {
        ((self.status >> 9) & 0x7) as u8
    }

    /// Successful completion?
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code_type() == 0 && self.status_code() == 0
    }
}

/// Generic status codes (SCT = 0)
pub mod generic_status {
    /// Successful Completion
    pub const SUCCESS: u8 = 0x00;
    /// Invalid Command Opcode
    pub const INVALID_OPCODE: u8 = 0x01;
    /// Invalid Field in Command
    pub const INVALID_FIELD: u8 = 0x02;
    /// Internal Error
    pub const INTERNAL_ERROR: u8 = 0x06;
    /// LBA Out of Range
    pub const LBA_OUT_OF_RANGE: u8 = 0x80;
}

// -- Size assertions

const _: () = {
    assert!(core::mem::size_of::<NvmeCommand>() == 64);
    assert!(core::mem::size_of::<NvmeCompletion>() == 16);
};
