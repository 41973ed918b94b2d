//! Device manager: exclusive per-device ownership with FIFO waiters.
//! Devices are identified by small integers and spring into existence on
//! first request.

use std::collections::{BTreeMap, VecDeque};

use log::info;

use crate::pmem::Pid;

#[derive(Debug, Default)]
struct Device {
    owner: Option<Pid>,
    waiters: VecDeque<Pid>,
}

pub struct DeviceManager {
    devices: BTreeMap<u32, Device>,
}

impl DeviceManager {
    pub fn new() -> DeviceManager {
        DeviceManager {
            devices: BTreeMap::new(),
        }
    }

    /// Try to take `dev` for `pid`. A free device is granted on the spot;
    /// the current owner re-requesting is granted too. Otherwise the PID
    /// joins the waiter FIFO once.
    pub fn request(&mut self, pid: Pid, dev: u32) -> bool {
        let device = self.devices.entry(dev).or_default();

        match device.owner {
            None => {
                device.owner = Some(pid);
                info!("[Dev] Device {} granted to PID {}", dev, pid);
                true
            }
            Some(owner) if owner == pid => true,
            Some(_) => {
                if !device.waiters.contains(&pid) {
                    device.waiters.push_back(pid);
                }
                info!("[Dev] PID {} waiting for device {}", pid, dev);
                false
            }
        }
    }

    /// Release `dev` held by `pid` and promote the head waiter, if any.
    /// Returns the new owner so the caller can wake it.
    pub fn release(&mut self, pid: Pid, dev: u32) -> Option<Pid> {
        let device = self.devices.get_mut(&dev)?;
        if device.owner != Some(pid) {
            info!("[Dev] PID {} does not own device {}", pid, dev);
            return None;
        }

        device.owner = device.waiters.pop_front();
        match device.owner {
            Some(next) => info!("[Dev] Device {} passed to PID {}", dev, next),
            None => info!("[Dev] Device {} released", dev),
        }
        device.owner
    }

    /// Drop `pid` from every waiter queue.
    pub fn cancel_wait(&mut self, pid: Pid) {
        for device in self.devices.values_mut() {
            device.waiters.retain(|&p| p != pid);
        }
    }

    /// Release every device owned by `pid`; the returned pairs name each
    /// device's successor for wakeup.
    pub fn release_all(&mut self, pid: Pid) -> Vec<(u32, Option<Pid>)> {
        let owned: Vec<u32> = self
            .devices
            .iter()
            .filter(|(_, d)| d.owner == Some(pid))
            .map(|(&dev, _)| dev)
            .collect();

        owned
            .into_iter()
            .map(|dev| (dev, self.release(pid, dev)))
            .collect()
    }

    pub fn owner(&self, dev: u32) -> Option<Pid> {
        self.devices.get(&dev).and_then(|d| d.owner)
    }

    pub fn waiters(&self, dev: u32) -> Vec<Pid> {
        self.devices
            .get(&dev)
            .map(|d| d.waiters.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn dump(&self) {
        println!("=== Devices ===");
        if self.devices.is_empty() {
            println!("(none in use)");
            return;
        }
        for (dev, device) in &self.devices {
            let owner = match device.owner {
                Some(pid) => pid.to_string(),
                None => "-".to_string(),
            };
            println!("Device {:3} | owner {:3} | waiting {:?}", dev, owner, device.waiters);
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
