//! SD card in SPI mode: init handshake and single-block transfers

use crate::block_device::{Block, BlockDevice};
use crate::config::*;
use crate::error::{Error, ProtocolError, Result};
use crate::transport::Transport;

const CMD0: u8 = 0;
const CMD8: u8 = 8;
const CMD13: u8 = 13;
const CMD17: u8 = 17;
const CMD24: u8 = 24;
const CMD55: u8 = 55;
const CMD58: u8 = 58;
const ACMD41: u8 = 41;

const R1_IDLE: u8 = 0x01;
const START_BLOCK: u8 = 0xFE;
const DATA_ACCEPTED: u8 = 0x05;
/// OCR byte 0, card capacity status
const OCR_CCS: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum CardKind {
    /// SD 2.0, byte addressed
    Standard,
    /// SDHC/SDXC, block addressed
    HighCapacity,
}

pub struct SdCard<T> {
    transport: T,
    kind: Option<CardKind>,
}

impl<T: Transport> SdCard<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            kind: None,
        }
    }

    pub fn card_kind(&self) -> Option<CardKind> {
        self.kind
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Forget the handshake, e.g. after the card lost power.
    pub fn mark_uninit(&mut self) {
        self.kind = None;
    }

    /// Run the SPI-mode handshake. Never retries beyond the fixed bounds.
    pub fn init(&mut self) -> Result<CardKind> {
        self.kind = None;
        self.transport.deselect()?;
        self.transport.clock_idle(SD_IDLE_CLOCK_BYTES)?;
        self.transport.select()?;
        let res = self.handshake();
        self.transport.deselect()?;
        let kind = res?;
        info!("SD card ready: {:?}", kind);
        self.kind = Some(kind);
        Ok(kind)
    }

    fn handshake(&mut self) -> Result<CardKind> {
        let mut idle = false;
        for _ in 0..SD_GO_IDLE_RETRIES {
            if self.command(CMD0, 0)? == R1_IDLE {
                idle = true;
                break;
            }
        }
        if !idle {
            warn!("SD: no response to CMD0");
            return Err(Error::DeviceNotReady);
        }

        let r1 = self.command(CMD8, 0x1AA)?;
        if r1 != R1_IDLE {
            return Err(ProtocolError::CommandRejected { cmd: CMD8, response: r1 }.into());
        }
        let mut echo = [0u8; 4];
        self.read_bytes(&mut echo)?;
        if echo[2] != 0x01 || echo[3] != 0xAA {
            return Err(ProtocolError::BadInterfaceCondition.into());
        }

        let mut ready = false;
        for _ in 0..SD_INIT_POLLS {
            if self.app_command(ACMD41, 1 << 30)? == 0 {
                ready = true;
                break;
            }
        }
        if !ready {
            warn!("SD: card never left idle state");
            return Err(Error::DeviceNotReady);
        }

        let r1 = self.command(CMD58, 0)?;
        if r1 != 0 {
            return Err(ProtocolError::CommandRejected { cmd: CMD58, response: r1 }.into());
        }
        let mut ocr = [0u8; 4];
        self.read_bytes(&mut ocr)?;
        Ok(if ocr[0] & OCR_CCS != 0 {
            CardKind::HighCapacity
        } else {
            CardKind::Standard
        })
    }

    /// Park the card in the idle state. Chip-select stays asserted.
    pub fn go_idle(&mut self) -> Result<()> {
        self.transport.select()?;
        self.command(CMD0, 0)?;
        self.kind = None;
        Ok(())
    }

    /// Send one command frame and return R1.
    fn command(&mut self, cmd: u8, arg: u32) -> Result<u8> {
        let crc = match cmd {
            CMD0 => 0x95,
            CMD8 => 0x87,
            _ => 0xFF,
        };
        self.transport.exchange(0x40 | cmd)?;
        self.transport.send(&arg.to_be_bytes())?;
        self.transport.exchange(crc)?;

        let mut r1 = self.transport.receive()?;
        let mut polls = 0;
        while r1 & 0x80 != 0 && polls < SD_R1_POLLS {
            r1 = self.transport.receive()?;
            polls += 1;
        }
        Ok(r1)
    }

    fn app_command(&mut self, cmd: u8, arg: u32) -> Result<u8> {
        let r1 = self.command(CMD55, 0)?;
        if r1 > R1_IDLE {
            return Ok(r1);
        }
        self.command(cmd, arg)
    }

    fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        for b in out.iter_mut() {
            *b = self.transport.receive()?;
        }
        Ok(())
    }

    /// Command argument for a byte offset on this card.
    fn address(&self, offset: u32) -> Result<u32> {
        match self.kind {
            Some(CardKind::Standard) => Ok(offset),
            Some(CardKind::HighCapacity) => Ok(offset / BLOCK_SIZE as u32),
            None => Err(Error::DeviceNotReady),
        }
    }

    fn wait_not_busy(&mut self) -> Result<()> {
        for _ in 0..SD_BUSY_POLLS {
            if self.transport.receive()? == 0xFF {
                return Ok(());
            }
        }
        Err(ProtocolError::BusyTimeout.into())
    }

    fn wait_start_block(&mut self) -> Result<()> {
        for _ in 0..SD_START_TOKEN_POLLS {
            match self.transport.receive()? {
                START_BLOCK => return Ok(()),
                0xFF => {}
                token => return Err(ProtocolError::UnexpectedToken(token).into()),
            }
        }
        Err(ProtocolError::StartTokenTimeout.into())
    }

    fn write_selected(&mut self, arg: u32, data: &[u8]) -> Result<()> {
        let r1 = self.command(CMD24, arg)?;
        if r1 != 0 {
            return Err(ProtocolError::CommandRejected { cmd: CMD24, response: r1 }.into());
        }
        self.transport.exchange(START_BLOCK)?;
        self.transport.send(data)?;
        for _ in data.len()..BLOCK_SIZE {
            self.transport.exchange(0x00)?;
        }
        // CRC is ignored in SPI mode
        self.transport.clock_idle(2)?;

        let resp = self.transport.receive()?;
        if resp & 0x1F != DATA_ACCEPTED {
            return Err(ProtocolError::DataRejected(resp).into());
        }
        self.wait_not_busy()?;

        let r1 = self.command(CMD13, 0)?;
        let r2 = self.transport.receive()?;
        if r1 != 0 || r2 != 0 {
            return Err(ProtocolError::StatusError { r1, r2 }.into());
        }
        Ok(())
    }

    fn read_selected(&mut self, arg: u32, block: &mut Block) -> Result<()> {
        let r1 = self.command(CMD17, arg)?;
        if r1 != 0 {
            return Err(ProtocolError::CommandRejected { cmd: CMD17, response: r1 }.into());
        }
        self.wait_start_block()?;
        self.read_bytes(block)?;
        self.transport.clock_idle(2)
    }
}

impl<T: Transport> BlockDevice for SdCard<T> {
    fn read_block(&mut self, offset: u32, block: &mut Block) -> Result<()> {
        let arg = self.address(offset)?;
        self.transport.select()?;
        let res = self.read_selected(arg, block);
        self.transport.deselect()?;
        if let Err(e) = res {
            error!("SD read at {} failed: {:?}", offset, e);
        }
        res
    }

    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        if data.len() > BLOCK_SIZE {
            return Err(Error::BufferOverflow);
        }
        let arg = self.address(offset)?;
        self.transport.select()?;
        let res = self.write_selected(arg, data);
        self.transport.deselect()?;
        if let Err(e) = res {
            error!("SD write at {} failed: {:?}", offset, e);
        }
        res
    }
}
