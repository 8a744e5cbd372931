//! Config-memory backends: the `ConfigMemory` trait every Memory
//! Config handler is written against, an in-RAM reference backend for
//! tests, and an `embedded-storage`-backed block layout for real
//! flash/EEPROM parts.

use core::cell::RefCell;

use embedded_storage::Storage as StorageDriver;
use openlcb_core::event::EventId;
use openlcb_defs::ConfigSpace;
use rclite::Rc;

use crate::params::{NodeParamBytes, NODE_PARAMS_LEN};
use crate::Error;

/// Read/write access to one of the eight OpenLCB config-memory address
/// spaces, addressed the way `spec.md` §6 describes: a one-byte space
/// selector plus a 32-bit offset.
pub trait ConfigMemory {
    fn read(&mut self, space: ConfigSpace, offset: u32, buf: &mut [u8]) -> Result<(), Error>;
    fn write(&mut self, space: ConfigSpace, offset: u32, buf: &[u8]) -> Result<(), Error>;
    /// Length of `space` in bytes, or 0 if this backend doesn't carry it.
    fn space_len(&self, space: ConfigSpace) -> u32;
}

/// In-RAM reference backend: backs the Config/All space with one fixed
/// buffer and ACDI-User with another. Not a production backend; for
/// tests and doc examples the way the teacher's persistence crate has
/// an in-memory dev example alongside its flash-backed one.
pub struct InMemoryConfig<const CONFIG_LEN: usize, const USER_LEN: usize> {
    config: [u8; CONFIG_LEN],
    acdi_user: [u8; USER_LEN],
}

impl<const CONFIG_LEN: usize, const USER_LEN: usize> InMemoryConfig<CONFIG_LEN, USER_LEN> {
    pub const fn new() -> Self {
        InMemoryConfig {
            config: [0xFF; CONFIG_LEN],
            acdi_user: [0; USER_LEN],
        }
    }
}

impl<const CONFIG_LEN: usize, const USER_LEN: usize> Default for InMemoryConfig<CONFIG_LEN, USER_LEN> {
    fn default() -> Self {
        Self::new()
    }
}

fn slice_for(space: ConfigSpace, config: &[u8], acdi_user: &[u8]) -> Result<&[u8], Error> {
    match space {
        ConfigSpace::Config | ConfigSpace::All => Ok(config),
        ConfigSpace::AcdiUser => Ok(acdi_user),
        _ => Err(Error::NotPermitted),
    }
}

fn bounds(offset: u32, len: usize, backing_len: usize) -> Result<(usize, usize), Error> {
    let start = offset as usize;
    let end = start.checked_add(len).ok_or(Error::OutOfRange)?;
    if end > backing_len {
        return Err(Error::OutOfRange);
    }
    Ok((start, end))
}

impl<const CONFIG_LEN: usize, const USER_LEN: usize> ConfigMemory for InMemoryConfig<CONFIG_LEN, USER_LEN> {
    fn read(&mut self, space: ConfigSpace, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        let backing = slice_for(space, &self.config, &self.acdi_user)?;
        let (start, end) = bounds(offset, buf.len(), backing.len())?;
        buf.copy_from_slice(&backing[start..end]);
        Ok(())
    }

    fn write(&mut self, space: ConfigSpace, offset: u32, buf: &[u8]) -> Result<(), Error> {
        if !space.is_writable() {
            return Err(Error::NotPermitted);
        }
        let backing = match space {
            ConfigSpace::Config | ConfigSpace::All => &mut self.config[..],
            ConfigSpace::AcdiUser => &mut self.acdi_user[..],
            _ => return Err(Error::NotPermitted),
        };
        let (start, end) = bounds(offset, buf.len(), backing.len())?;
        backing[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn space_len(&self, space: ConfigSpace) -> u32 {
        match space {
            ConfigSpace::Config | ConfigSpace::All => CONFIG_LEN as u32,
            ConfigSpace::AcdiUser => USER_LEN as u32,
            _ => 0,
        }
    }
}

/// Persisted status of one producer/consumer event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PersistedEventStatus {
    Unknown = 0,
    Set = 1,
    Clear = 2,
    Reserved = 3,
}

impl PersistedEventStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PersistedEventStatus::Set,
            2 => PersistedEventStatus::Clear,
            3 => PersistedEventStatus::Reserved,
            _ => PersistedEventStatus::Unknown,
        }
    }
}

const EVENT_ID_LEN: usize = 8;
const EVENT_SLOT_LEN: usize = EVENT_ID_LEN + 1;

/// `embedded-storage`-backed config block: node params, then the
/// producer event table, then the consumer event table, one after
/// another from `OFFSET`. Mirrors the teacher's
/// `PersistentNodeConfigStorage` const-generic block layout
/// (`OFFSET`/`MAX_EVENTS`/... there becomes `OFFSET`/`MAX_PRODUCERS`/
/// `MAX_CONSUMERS` here) and its read-modify-write-only-on-diff flush
/// discipline.
pub struct PersistentConfigMemory<D: StorageDriver, const OFFSET: usize, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize>
{
    driver: Rc<RefCell<D>>,
}

impl<D: StorageDriver, const OFFSET: usize, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize>
    PersistentConfigMemory<D, OFFSET, MAX_PRODUCERS, MAX_CONSUMERS>
{
    pub fn new(driver: Rc<RefCell<D>>) -> Self {
        PersistentConfigMemory { driver }
    }

    const fn params_addr() -> usize {
        OFFSET
    }

    const fn producer_addr_start() -> usize {
        Self::params_addr() + NODE_PARAMS_LEN
    }

    const fn consumer_addr_start() -> usize {
        Self::producer_addr_start() + EVENT_SLOT_LEN * MAX_PRODUCERS
    }

    pub const fn block_end() -> usize {
        Self::consumer_addr_start() + EVENT_SLOT_LEN * MAX_CONSUMERS
    }

    pub fn load_params(&mut self) -> Result<NodeParamBytes, Error> {
        let mut buf = [0u8; NODE_PARAMS_LEN];
        self.driver
            .borrow_mut()
            .read(Self::params_addr() as u32, &mut buf)
            .map_err(|_| Error::Storage)?;
        Ok(NodeParamBytes::from_bytes(buf))
    }

    pub fn store_params(&mut self, params: &NodeParamBytes) -> Result<(), Error> {
        self.driver
            .borrow_mut()
            .write(Self::params_addr() as u32, params.as_bytes())
            .map_err(|_| Error::Storage)
    }

    fn event_slot_addr(table_start: usize, index: usize) -> u32 {
        (table_start + index * EVENT_SLOT_LEN) as u32
    }

    fn load_event_slot(&mut self, addr: u32) -> Result<(EventId, PersistedEventStatus), Error> {
        let mut buf = [0u8; EVENT_SLOT_LEN];
        self.driver.borrow_mut().read(addr, &mut buf).map_err(|_| Error::Storage)?;
        Ok((
            EventId::from_bytes(&buf[..EVENT_ID_LEN]),
            PersistedEventStatus::from_u8(buf[EVENT_ID_LEN]),
        ))
    }

    fn store_event_slot(&mut self, addr: u32, id: EventId, status: PersistedEventStatus) -> Result<(), Error> {
        let mut buf = [0u8; EVENT_SLOT_LEN];
        buf[..EVENT_ID_LEN].copy_from_slice(id.as_bytes());
        buf[EVENT_ID_LEN] = status as u8;
        self.driver.borrow_mut().write(addr, &buf).map_err(|_| Error::Storage)
    }

    pub fn load_producer(&mut self, index: usize) -> Result<(EventId, PersistedEventStatus), Error> {
        if index >= MAX_PRODUCERS {
            return Err(Error::OutOfRange);
        }
        let addr = Self::event_slot_addr(Self::producer_addr_start(), index);
        self.load_event_slot(addr)
    }

    pub fn store_producer(&mut self, index: usize, id: EventId, status: PersistedEventStatus) -> Result<(), Error> {
        if index >= MAX_PRODUCERS {
            return Err(Error::OutOfRange);
        }
        let addr = Self::event_slot_addr(Self::producer_addr_start(), index);
        self.store_event_slot(addr, id, status)
    }

    pub fn load_consumer(&mut self, index: usize) -> Result<(EventId, PersistedEventStatus), Error> {
        if index >= MAX_CONSUMERS {
            return Err(Error::OutOfRange);
        }
        let addr = Self::event_slot_addr(Self::consumer_addr_start(), index);
        self.load_event_slot(addr)
    }

    pub fn store_consumer(&mut self, index: usize, id: EventId, status: PersistedEventStatus) -> Result<(), Error> {
        if index >= MAX_CONSUMERS {
            return Err(Error::OutOfRange);
        }
        let addr = Self::event_slot_addr(Self::consumer_addr_start(), index);
        self.store_event_slot(addr, id, status)
    }
}

impl<D: StorageDriver, const OFFSET: usize, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize> ConfigMemory
    for PersistentConfigMemory<D, OFFSET, MAX_PRODUCERS, MAX_CONSUMERS>
{
    /// Only the `Config`/`All` space is addressable this way; event
    /// slots are reached through `load_producer`/`load_consumer` and
    /// their counterparts instead, since this trait has no notion of
    /// per-slot status bytes.
    fn read(&mut self, space: ConfigSpace, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        if !matches!(space, ConfigSpace::Config | ConfigSpace::All) {
            return Err(Error::NotPermitted);
        }
        let (start, end) = bounds(offset, buf.len(), NODE_PARAMS_LEN)?;
        let mut params = [0u8; NODE_PARAMS_LEN];
        self.driver
            .borrow_mut()
            .read(Self::params_addr() as u32, &mut params)
            .map_err(|_| Error::Storage)?;
        buf.copy_from_slice(&params[start..end]);
        Ok(())
    }

    fn write(&mut self, space: ConfigSpace, offset: u32, buf: &[u8]) -> Result<(), Error> {
        if !matches!(space, ConfigSpace::Config | ConfigSpace::All) {
            return Err(Error::NotPermitted);
        }
        let (start, end) = bounds(offset, buf.len(), NODE_PARAMS_LEN)?;
        let mut params = [0u8; NODE_PARAMS_LEN];
        self.driver
            .borrow_mut()
            .read(Self::params_addr() as u32, &mut params)
            .map_err(|_| Error::Storage)?;
        params[start..end].copy_from_slice(buf);
        self.driver
            .borrow_mut()
            .write(Self::params_addr() as u32, &params)
            .map_err(|_| Error::Storage)
    }

    fn space_len(&self, space: ConfigSpace) -> u32 {
        match space {
            ConfigSpace::Config | ConfigSpace::All => NODE_PARAMS_LEN as u32,
            _ => 0,
        }
    }
}
