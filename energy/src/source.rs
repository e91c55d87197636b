use std::io;

/// Raw access to hardware energy counters.
pub trait EnergySource {
    type Handle;

    /// perf counter type the meter opens its channels with.
    fn type_id(&self) -> u32;

    fn open_counter(&mut self, type_id: u32, event_code: u64) -> io::Result<Self::Handle>;

    fn read_counter(&mut self, handle: &Self::Handle) -> io::Result<i64>;

    fn close_counter(&mut self, handle: Self::Handle);
}

/// Source for platforms without energy counters. Every open fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSource;

impl EnergySource for UnsupportedSource {
    type Handle = ();

    fn type_id(&self) -> u32 {
        crate::DEFAULT_POWER_TYPE
    }

    fn open_counter(&mut self, _type_id: u32, _event_code: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "energy counters are not supported on this platform",
        ))
    }

    fn read_counter(&mut self, _handle: &()) -> io::Result<i64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "energy counters are not supported on this platform",
        ))
    }

    fn close_counter(&mut self, _handle: ()) {}
}

#[cfg(target_os = "linux")]
pub use perf::PerfEventSource;

#[cfg(target_os = "linux")]
mod perf {
    use std::fs::{self, File};
    use std::io::{self, Read};
    use std::os::fd::{FromRawFd, RawFd};

    use super::EnergySource;

    const POWER_TYPE_PATH: &str = "/sys/bus/event_source/devices/power/type";

    // PERF_ATTR_SIZE_VER0 layout; the kernel zero-extends the rest.
    #[repr(C)]
    #[derive(Debug, Default)]
    struct PerfEventAttr {
        type_: u32,
        size: u32,
        config: u64,
        sample_period: u64,
        sample_type: u64,
        read_format: u64,
        flags: u64,
        wakeup_events: u32,
        bp_type: u32,
        config1: u64,
    }

    /// Opens RAPL counters through `perf_event_open`, system wide on CPU 0.
    ///
    /// Usually needs root or `perf_event_paranoid <= 0`.
    #[derive(Debug, Clone, Copy)]
    pub struct PerfEventSource {
        type_id: u32,
        cpu: i32,
    }

    impl PerfEventSource {
        pub fn new(type_id: u32) -> Self {
            Self { type_id, cpu: 0 }
        }

        /// Reads the power PMU type from sysfs, falling back to
        /// [`crate::DEFAULT_POWER_TYPE`].
        pub fn discover() -> Self {
            let type_id = match fs::read_to_string(POWER_TYPE_PATH) {
                Ok(content) => match content.trim().parse() {
                    Ok(type_id) => type_id,
                    Err(e) => {
                        log::warn!("Unparsable {}: {}", POWER_TYPE_PATH, e);
                        crate::DEFAULT_POWER_TYPE
                    }
                },
                Err(e) => {
                    log::warn!("Cannot read {}: {}", POWER_TYPE_PATH, e);
                    crate::DEFAULT_POWER_TYPE
                }
            };
            log::debug!("Using perf power type {:#x}", type_id);
            Self::new(type_id)
        }

        pub fn cpu(mut self, cpu: i32) -> Self {
            self.cpu = cpu;
            self
        }
    }

    impl EnergySource for PerfEventSource {
        type Handle = File;

        fn type_id(&self) -> u32 {
            self.type_id
        }

        fn open_counter(&mut self, type_id: u32, event_code: u64) -> io::Result<File> {
            let attr = PerfEventAttr {
                type_: type_id,
                size: std::mem::size_of::<PerfEventAttr>() as u32,
                config: event_code,
                ..Default::default()
            };
            let fd = unsafe {
                libc::syscall(
                    libc::SYS_perf_event_open,
                    &attr as *const PerfEventAttr,
                    -1 as libc::pid_t,
                    self.cpu as libc::c_int,
                    -1 as libc::c_int,
                    0 as libc::c_ulong,
                )
            };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            // the kernel handed us a fresh descriptor that nothing else owns
            Ok(unsafe { File::from_raw_fd(fd as RawFd) })
        }

        fn read_counter(&mut self, handle: &File) -> io::Result<i64> {
            let mut buf = [0u8; 8];
            let mut reader = handle;
            reader.read_exact(&mut buf)?;
            Ok(i64::from_ne_bytes(buf))
        }

        fn close_counter(&mut self, handle: File) {
            drop(handle);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_source_never_opens() {
        let mut source = UnsupportedSource;
        let err = source.open_counter(source.type_id(), 0x02).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
