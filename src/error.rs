use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("bad dimensions {width}x{height}: each side must be a nonzero multiple of the {tile}px tile")]
    BadDimensions { width: u32, height: u32, tile: u32 },

    #[error("tile bits {0} out of range 1..=8")]
    BadTileBits(u32),

    #[error("chaos levels {0} out of range 1..=16")]
    BadChaosLevels(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bitstream truncated at bit {bit}")]
    Truncated { bit: usize },

    #[error("invalid huffman code lengths: {0}")]
    BadCodeLengths(&'static str),

    #[error("no huffman code matches the next {0} bits")]
    BadSymbol(u8),

    #[error("spatial filter id {id} out of range (catalogue has {max})")]
    BadFilterId { id: u8, max: u8 },

    #[error("desync marker mismatch after {context}")]
    Desync { context: &'static str },

    #[error("output buffer holds {got} bytes, need {need}")]
    BadOutputSize { got: usize, need: usize },
}
