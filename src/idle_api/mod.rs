//! Idle-time sampling for different environments. [GenericIdleMonitor] is the
//! main artifact of this module, dispatching to whichever backend the build
//! enabled.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;

/// Contract the platform backends must implement.
#[cfg_attr(test, mockall::automock)]
pub trait IdleMonitor: Send + 'static {
    /// Seconds since the last user input.
    fn idle_seconds(&mut self) -> Result<u32>;
}

/// Serves as a cross-compatible IdleMonitor implementation.
pub struct GenericIdleMonitor {
    inner: Box<dyn IdleMonitor>,
}

impl GenericIdleMonitor {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsIdleMonitor;
                Ok(Self {
                    inner: Box::new(WindowsIdleMonitor::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11IdleMonitor;
                Ok(Self {
                    inner: Box::new(X11IdleMonitor::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled during testing.
                unimplemented!("No idle monitor backend was enabled")
            }
        }
    }
}

impl IdleMonitor for GenericIdleMonitor {
    fn idle_seconds(&mut self) -> Result<u32> {
        self.inner.idle_seconds()
    }
}
