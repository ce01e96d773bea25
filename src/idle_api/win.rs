use anyhow::{anyhow, Result};
use tracing::error;
use windows::Win32::{
    System::SystemInformation::GetTickCount64,
    UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
};

use super::IdleMonitor;

fn idle_milliseconds() -> Result<u64> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        error!("Failed to retrieve user idle time");
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    let tick_count = unsafe { GetTickCount64() };
    Ok(tick_count - last.dwTime as u64)
}

pub struct WindowsIdleMonitor {}

impl WindowsIdleMonitor {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsIdleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleMonitor for WindowsIdleMonitor {
    fn idle_seconds(&mut self) -> Result<u32> {
        let millis = idle_milliseconds()
            .inspect_err(|e| error!("Failed to get idle time {e:?}"))?;
        Ok(u64::min(millis / 1000, u32::MAX as u64) as u32)
    }
}
