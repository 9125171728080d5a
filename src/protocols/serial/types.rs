/// Marks the first line of a frame.
pub const START_DELIMITER: [u8; 2] = [0x06, 0x09];
/// Marks every following line of the same frame.
pub const CONTINUE_DELIMITER: [u8; 2] = [0x04, 0x14];
pub const END_CHAR: u8 = b'\n';

pub const DELIMITER_SIZE: usize = 2;
/// Delimiter plus the terminating newline.
pub const FRAGMENT_OVERHEAD: usize = DELIMITER_SIZE + 1;

pub const LENGTH_SIZE: usize = 2;
pub const CRC_SIZE: usize = 2;

/// Lines longer than this without a newline are treated as noise.
pub const MAX_LINE_LENGTH: usize = 4096;
