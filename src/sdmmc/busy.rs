use embedded_hal::{blocking::spi::Transfer, digital::v2::OutputPin};
use log::trace;

use crate::sdmmc_proto::*;

use super::{Error, Retry};

/// Bytes clocked out while waiting for an R1 response.
const R1_POLL_LIMIT: usize = 512;

/// A conversation with the card: chip select is held low until this is
/// dropped.
///
/// Command framing, CRCs and the polling for responses and data tokens all
/// live here.
pub struct SdMmcSpiBusy<'spi, 'cs, SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    spi: &'spi mut SPI,
    cs: &'cs mut CS,
}

impl<'spi, 'cs, SPI, CS> Drop for SdMmcSpiBusy<'spi, 'cs, SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    fn drop(&mut self) {
        self.cs.set_high().ok();
    }
}

/// Six bytes on the wire: start and transmission bits with the index, the
/// big-endian argument, then CRC7 and the end bit.
pub(crate) fn command_frame(command: u8, arg: u32) -> [u8; 6] {
    let [a0, a1, a2, a3] = arg.to_be_bytes();
    let mut frame = [0x40 | command, a0, a1, a2, a3, 0];
    frame[5] = crc7(&frame[..5]);
    frame
}

impl<'spi, 'cs, SPI, CS> SdMmcSpiBusy<'spi, 'cs, SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: &'spi mut SPI, cs: &'cs mut CS) -> Result<Self, Error> {
        cs.set_low().map_err(|_| Error::GpioError)?;
        Ok(Self { spi, cs })
    }

    fn exchange(&mut self, out: u8) -> Result<u8, Error> {
        let mut word = [out];
        self.spi
            .transfer(&mut word)
            .map(|b| b[0])
            .map_err(|_| Error::Transport)
    }

    /// Clock in one byte.
    pub fn receive(&mut self) -> Result<u8, Error> {
        self.exchange(0xFF)
    }

    pub fn receive_into(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        buffer
            .iter_mut()
            .try_for_each(|b| self.receive().map(|byte| *b = byte))
    }

    pub fn send(&mut self, out: u8) -> Result<(), Error> {
        self.exchange(out).map(|_| ())
    }

    fn send_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        bytes.iter().try_for_each(|&b| self.send(b))
    }

    /// Receive until a byte other than 0xFF shows up, spending `err` polls.
    fn first_non_idle(&mut self, err: Error) -> Result<u8, Error> {
        let mut retry = Retry::new();
        loop {
            match self.receive()? {
                0xFF => retry.spend(err)?,
                byte => return Ok(byte),
            }
        }
    }

    /// A busy card holds MISO low. Wait for it to let go.
    pub fn wait_not_busy(&mut self) -> Result<(), Error> {
        let mut retry = Retry::new();
        while self.receive()? != 0xFF {
            retry.spend(Error::TimeoutWaitNotBusy)?;
        }
        Ok(())
    }

    /// Send a command and return its R1 response.
    pub fn card_command(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        self.wait_not_busy()?;
        self.send_all(&command_frame(command, arg))?;

        // CMD12 is followed by a stuff byte.
        if command == CMD12 {
            self.receive()?;
        }

        for _ in 0..R1_POLL_LIMIT {
            let r1 = self.receive()?;
            if r1 & 0x80 == ERROR_OK {
                trace!("CMD{} -> {:#04x}", command, r1);
                return Ok(r1);
            }
        }
        Err(Error::TimeoutCommand(command))
    }

    /// CMD55 then `command`.
    pub fn card_acmd(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        self.card_command(CMD55, 0)?;
        self.card_command(command, arg)
    }

    /// Receive one data packet into `buffer`, which must be the size of the
    /// packet, and check its CRC16.
    pub fn read_data(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        if self.first_non_idle(Error::TimeoutReadBuffer)? != DATA_START_BLOCK {
            return Err(Error::ReadError);
        }
        self.receive_into(buffer)?;

        let mut crc = [0u8; 2];
        self.receive_into(&mut crc)?;
        let received = u16::from_be_bytes(crc);
        let computed = crc16(buffer);
        if received != computed {
            return Err(Error::CrcError(received, computed));
        }
        Ok(())
    }

    /// Send `token`, the packet and its CRC16, then check the data response.
    pub fn write_data(&mut self, token: u8, buffer: &[u8]) -> Result<(), Error> {
        let crc = crc16(buffer);
        self.send(token)?;
        self.send_all(buffer)?;
        self.send_all(&crc.to_be_bytes())?;
        match self.receive()? & DATA_RES_MASK {
            DATA_RES_ACCEPTED => Ok(()),
            _ => Err(Error::WriteError),
        }
    }
}
