//! Canonical byte encoding of transfers.
//!
//! ```text
//! tag (u8: 1 direct, 2 locked) ‖ nonce (u64 BE) ‖ asset (20) ‖ channel (20) ‖ recipient (20) ‖
//! transferred_amount (u64 BE) ‖ locksroot (32) [‖ lock (48) ‖ target (20) ‖ initiator (20)]
//! ```
//!
//! Signatures are made over `H(bytes)`, so two independently written nodes must agree on this layout bit for bit.

use crate::amount::TokenAmount;
use crate::crypto::{Address, Hash256, Signature};
use crate::error::ReadError;
use crate::transfer::{DirectTransfer, Lock, LockedTransfer, SignedTransfer, Transfer};
use std::io::{self, Read, Write};

pub const DIRECT_TAG: u8 = 1;
pub const LOCKED_TAG: u8 = 2;

pub trait Writable {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write(&mut buf);
        buf
    }
}

pub trait Readable: Sized {
    fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError>;

    /// Decodes a value that must occupy the whole of `bytes`.
    fn from_slice(bytes: &[u8]) -> Result<Self, ReadError> {
        let mut reader = bytes;
        let value = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(ReadError::new("trailing", format!("{} unexpected trailing bytes", reader.len())));
        }
        Ok(value)
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R, field: &str) -> Result<[u8; N], ReadError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| ReadError::new(field, format!("Failed to read {N} bytes: {e}")))?;
    Ok(buf)
}

fn read_u64<R: Read>(reader: &mut R, field: &str) -> Result<u64, ReadError> {
    read_array::<R, 8>(reader, field).map(u64::from_be_bytes)
}

fn read_address<R: Read>(reader: &mut R, field: &str) -> Result<Address, ReadError> {
    read_array::<R, 20>(reader, field).map(Address::new)
}

impl Writable for Lock {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.as_bytes())
    }
}

impl Readable for Lock {
    fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        let bytes = read_array::<R, { Lock::SIZE }>(reader, "lock")?;
        Lock::from_bytes(&bytes)
    }
}

/// The fields shared by both transfer kinds, in wire order after the tag.
struct Header {
    nonce: u64,
    asset: Address,
    channel: Address,
    recipient: Address,
    transferred_amount: TokenAmount,
    locksroot: Hash256,
}

impl Header {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.nonce.to_be_bytes())?;
        writer.write_all(self.asset.as_bytes())?;
        writer.write_all(self.channel.as_bytes())?;
        writer.write_all(self.recipient.as_bytes())?;
        writer.write_all(&self.transferred_amount.value().to_be_bytes())?;
        writer.write_all(self.locksroot.as_bytes())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Header {
            nonce: read_u64(reader, "nonce")?,
            asset: read_address(reader, "asset")?,
            channel: read_address(reader, "channel")?,
            recipient: read_address(reader, "recipient")?,
            transferred_amount: TokenAmount::new(read_u64(reader, "transferred_amount")?),
            locksroot: Hash256::new(read_array(reader, "locksroot")?),
        })
    }
}

impl Writable for Transfer {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let header = Header {
            nonce: self.nonce(),
            asset: self.asset(),
            channel: self.channel(),
            recipient: self.recipient(),
            transferred_amount: self.transferred_amount(),
            locksroot: self.locksroot(),
        };
        match self {
            Transfer::Direct(_) => {
                writer.write_all(&[DIRECT_TAG])?;
                header.write(writer)
            }
            Transfer::Locked(t) => {
                writer.write_all(&[LOCKED_TAG])?;
                header.write(writer)?;
                t.lock.write(writer)?;
                writer.write_all(t.target.as_bytes())?;
                writer.write_all(t.initiator.as_bytes())
            }
        }
    }
}

impl Readable for Transfer {
    fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        let [tag] = read_array::<R, 1>(reader, "tag")?;
        match tag {
            DIRECT_TAG => {
                let h = Header::read(reader)?;
                Ok(Transfer::Direct(DirectTransfer {
                    nonce: h.nonce,
                    asset: h.asset,
                    channel: h.channel,
                    recipient: h.recipient,
                    transferred_amount: h.transferred_amount,
                    locksroot: h.locksroot,
                }))
            }
            LOCKED_TAG => {
                let h = Header::read(reader)?;
                let lock = Lock::read(reader)?;
                let target = read_address(reader, "target")?;
                let initiator = read_address(reader, "initiator")?;
                Ok(Transfer::Locked(LockedTransfer {
                    nonce: h.nonce,
                    asset: h.asset,
                    channel: h.channel,
                    recipient: h.recipient,
                    transferred_amount: h.transferred_amount,
                    locksroot: h.locksroot,
                    lock,
                    target,
                    initiator,
                }))
            }
            _ => Err(ReadError::new("tag", format!("Invalid transfer tag: {tag}"))),
        }
    }
}

/// A signed transfer on the wire is the transfer bytes followed by the 64-byte signature.
impl Writable for SignedTransfer {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.transfer.write(writer)?;
        writer.write_all(&self.signature.to_bytes())
    }
}

impl Readable for SignedTransfer {
    fn read<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        let transfer = Transfer::read(reader)?;
        let signature = Signature::from_bytes(&read_array::<R, { Signature::SIZE }>(reader, "signature")?);
        Ok(SignedTransfer { transfer, signature })
    }
}
