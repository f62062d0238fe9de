//! Environment table - slot allocation and id validation

use super::env::Env;
use alloc::vec::Vec;
use libcowfork::{EnvId, Errno, ENVGENSHIFT, NENV};

/// Fixed-size table of environments.
///
/// Ids encode the slot in their low bits and a per-slot generation above
/// `ENVGENSHIFT`, so an id stays invalid once its environment is freed even
/// after the slot is reused.
pub struct EnvTable {
    slots: Vec<Option<Env>>,
    /// Last id handed out for each slot, kept across frees
    last_ids: Vec<u32>,
}

impl EnvTable {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, NENV);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        EnvTable {
            slots,
            last_ids: alloc::vec![0; capacity],
        }
    }

    /// Claim the lowest free slot for a new environment.
    pub fn alloc(&mut self, parent_id: Option<EnvId>) -> Result<EnvId, Errno> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Errno::EAGAIN)?;

        let mut generation = self.last_ids[index].wrapping_add(1 << ENVGENSHIFT) & !(NENV as u32 - 1);
        if generation as i32 <= 0 {
            generation = 1 << ENVGENSHIFT;
        }
        let id = EnvId::from_raw(generation | index as u32);
        self.last_ids[index] = id.raw();
        self.slots[index] = Some(Env::new(id, parent_id));
        log::debug!("env_alloc: [{:08x}] new env {}", parent_id.map_or(0, EnvId::raw), id);
        Ok(id)
    }

    /// Live environment with exactly this id.
    pub fn get(&self, id: EnvId) -> Result<&Env, Errno> {
        match self.slots.get(id.index()).and_then(Option::as_ref) {
            Some(env) if env.id == id => Ok(env),
            _ => Err(Errno::ESRCH),
        }
    }

    pub fn get_mut(&mut self, id: EnvId) -> Result<&mut Env, Errno> {
        match self.slots.get_mut(id.index()).and_then(Option::as_mut) {
            Some(env) if env.id == id => Ok(env),
            _ => Err(Errno::ESRCH),
        }
    }

    /// Remove an environment from the table.
    pub fn free(&mut self, id: EnvId) -> Option<Env> {
        let slot = self.slots.get_mut(id.index())?;
        match slot {
            Some(env) if env.id == id => slot.take(),
            _ => None,
        }
    }

    /// Live environments in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Env> {
        self.slots.iter().flatten()
    }

    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
