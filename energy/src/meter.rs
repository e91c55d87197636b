use crate::{Channel, EnergyError, EnergySource, EnergyUsage, RAPL_SCALE};

enum MeterState<H> {
    Idle,
    Measuring { handles: Vec<H>, before: [i64; 3] },
    Closed { before: [i64; 3], after: [i64; 3] },
    Failed,
}

impl<H> MeterState<H> {
    fn name(&self) -> &'static str {
        match self {
            MeterState::Idle => "idle",
            MeterState::Measuring { .. } => "measuring",
            MeterState::Closed { .. } => "closed",
            MeterState::Failed => "failed",
        }
    }
}

/// Single-use measurement bracket over the core, package and RAM domains.
///
/// Handles are in [`Channel::ALL`] order and are released on every exit path,
/// including drop while still measuring. A new measurement needs a new meter.
pub struct EnergyMeter<S: EnergySource> {
    source: S,
    scale: f64,
    state: MeterState<S::Handle>,
}

impl<S: EnergySource> EnergyMeter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            scale: RAPL_SCALE,
            state: MeterState::Idle,
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn is_measuring(&self) -> bool {
        matches!(self.state, MeterState::Measuring { .. })
    }

    /// Opens the three counters and reads their baselines.
    pub fn start(&mut self) -> Result<(), EnergyError> {
        if !matches!(self.state, MeterState::Idle) {
            return Err(EnergyError::InvalidState {
                state: self.state.name(),
                expected: "idle",
            });
        }

        let type_id = self.source.type_id();
        let mut handles = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            match self.source.open_counter(type_id, channel.event_code()) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    self.release(handles);
                    self.state = MeterState::Failed;
                    return Err(EnergyError::CounterUnavailable { channel, source });
                }
            }
        }

        match self.read_all(&handles) {
            Ok(before) => {
                log::debug!("Energy baseline {:?}", before);
                self.state = MeterState::Measuring { handles, before };
                Ok(())
            }
            Err(e) => {
                self.release(handles);
                self.state = MeterState::Failed;
                Err(e)
            }
        }
    }

    /// Reads the end values and releases the counters.
    pub fn stop(&mut self) -> Result<(), EnergyError> {
        let (handles, before) = match std::mem::replace(&mut self.state, MeterState::Failed) {
            MeterState::Measuring { handles, before } => (handles, before),
            other => {
                let state = other.name();
                self.state = other;
                return Err(EnergyError::InvalidState {
                    state,
                    expected: "measuring",
                });
            }
        };

        let after = self.read_all(&handles);
        self.release(handles);
        let after = after?;
        log::debug!("Energy end values {:?}", after);
        self.state = MeterState::Closed { before, after };
        Ok(())
    }

    /// Joules consumed between `start` and `stop`.
    pub fn energy_usage(&self) -> Result<EnergyUsage, EnergyError> {
        let MeterState::Closed { before, after } = &self.state else {
            return Err(EnergyError::InvalidState {
                state: self.state.name(),
                expected: "closed",
            });
        };

        let mut usage = EnergyUsage::default();
        for (idx, channel) in Channel::ALL.into_iter().enumerate() {
            let delta = match after[idx].checked_sub(before[idx]) {
                Some(delta) => delta,
                None => {
                    log::debug!("{} energy counter wrapped around", channel);
                    after[idx].wrapping_sub(before[idx])
                }
            };
            if delta < 0 {
                log::warn!(
                    "{} energy counter went backwards ({} -> {})",
                    channel,
                    before[idx],
                    after[idx]
                );
            }
            let joules = delta as f64 * self.scale;
            match channel {
                Channel::Core => usage.core = joules,
                Channel::Pkg => usage.pkg = joules,
                Channel::Ram => usage.ram = joules,
            }
        }
        Ok(usage)
    }

    fn read_all(&mut self, handles: &[S::Handle]) -> Result<[i64; 3], EnergyError> {
        let mut values = [0i64; 3];
        for ((channel, handle), value) in Channel::ALL.into_iter().zip(handles).zip(&mut values) {
            *value = self
                .source
                .read_counter(handle)
                .map_err(|source| EnergyError::CounterUnavailable { channel, source })?;
        }
        Ok(values)
    }

    fn release(&mut self, handles: Vec<S::Handle>) {
        for handle in handles {
            self.source.close_counter(handle);
        }
    }
}

impl<S: EnergySource> Drop for EnergyMeter<S> {
    fn drop(&mut self) {
        if let MeterState::Measuring { handles, .. } =
            std::mem::replace(&mut self.state, MeterState::Failed)
        {
            log::debug!("Energy meter dropped while measuring, releasing counters");
            self.release(handles);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::io;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Ledger {
        opened: usize,
        closed: usize,
        reads: usize,
    }

    impl Ledger {
        fn leaked(&self) -> usize {
            self.opened - self.closed
        }
    }

    /// Hands out queued readings per event code.
    #[derive(Default)]
    struct FakeSource {
        ledger: Rc<RefCell<Ledger>>,
        readings: HashMap<u64, VecDeque<i64>>,
        fail_open: Option<u64>,
        fail_read_at: Option<usize>,
    }

    impl FakeSource {
        fn with_readings(before: [i64; 3], after: [i64; 3]) -> Self {
            let mut readings = HashMap::new();
            for (idx, channel) in Channel::ALL.into_iter().enumerate() {
                readings.insert(channel.event_code(), VecDeque::from(vec![before[idx], after[idx]]));
            }
            Self {
                readings,
                ..Default::default()
            }
        }

        fn ledger(&self) -> Rc<RefCell<Ledger>> {
            Rc::clone(&self.ledger)
        }
    }

    impl EnergySource for FakeSource {
        type Handle = u64;

        fn type_id(&self) -> u32 {
            crate::DEFAULT_POWER_TYPE
        }

        fn open_counter(&mut self, type_id: u32, event_code: u64) -> io::Result<u64> {
            assert_eq!(type_id, crate::DEFAULT_POWER_TYPE);
            if self.fail_open == Some(event_code) {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            self.ledger.borrow_mut().opened += 1;
            Ok(event_code)
        }

        fn read_counter(&mut self, handle: &u64) -> io::Result<i64> {
            let mut ledger = self.ledger.borrow_mut();
            if self.fail_read_at == Some(ledger.reads) {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            ledger.reads += 1;
            self.readings
                .get_mut(handle)
                .and_then(|queue| queue.pop_front())
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
        }

        fn close_counter(&mut self, _handle: u64) {
            self.ledger.borrow_mut().closed += 1;
        }
    }

    #[test]
    fn test_usage_is_scaled_delta() -> Result<(), EnergyError> {
        let source = FakeSource::with_readings([100, 1_000, 7], [150, 5_000, 7]);
        let ledger = source.ledger();
        let mut meter = EnergyMeter::new(source);

        meter.start()?;
        assert!(meter.is_measuring());
        meter.stop()?;
        let usage = meter.energy_usage()?;

        assert_eq!(usage.core, 50.0 * RAPL_SCALE);
        assert_eq!(usage.pkg, 4_000.0 * RAPL_SCALE);
        assert_eq!(usage.ram, 0.0);
        assert_eq!(usage.get(Channel::Pkg), usage.pkg);
        assert_eq!(ledger.borrow().opened, 3);
        assert_eq!(ledger.borrow().leaked(), 0);

        Ok(())
    }

    #[test]
    fn test_counter_going_backwards_keeps_sign() -> Result<(), EnergyError> {
        let _ = env_logger::builder().is_test(true).try_init();
        let source = FakeSource::with_readings([500, 10, 10], [20, 30, 10]);
        let mut meter = EnergyMeter::new(source);
        meter.start()?;
        meter.stop()?;

        let usage = meter.energy_usage()?;
        assert_eq!(usage.core, -480.0 * RAPL_SCALE);
        assert_eq!(usage.pkg, 20.0 * RAPL_SCALE);
        assert_eq!(usage.ram, 0.0);
        Ok(())
    }

    #[test]
    fn test_counter_wraparound() -> Result<(), EnergyError> {
        let _ = env_logger::builder().is_test(true).try_init();
        let source =
            FakeSource::with_readings([i64::MAX - 5, 0, i64::MIN], [i64::MIN + 4, 0, i64::MAX]);
        let mut meter = EnergyMeter::new(source);
        meter.start()?;
        meter.stop()?;

        let usage = meter.energy_usage()?;
        assert_eq!(usage.core, 10.0 * RAPL_SCALE);
        assert_eq!(usage.pkg, 0.0);
        assert_eq!(usage.ram, -1.0 * RAPL_SCALE);
        Ok(())
    }

    #[test]
    fn test_custom_scale() -> Result<(), EnergyError> {
        let source = FakeSource::with_readings([0, 0, 0], [2, 4, 6]);
        let mut meter = EnergyMeter::new(source).scale(0.5);
        meter.start()?;
        meter.stop()?;

        assert_eq!(
            meter.energy_usage()?,
            EnergyUsage {
                pkg: 2.0,
                core: 1.0,
                ram: 3.0
            }
        );
        Ok(())
    }

    #[test]
    fn test_failed_open_releases_opened_counters() {
        let mut source = FakeSource::with_readings([0; 3], [0; 3]);
        source.fail_open = Some(Channel::Ram.event_code());
        let ledger = source.ledger();
        let mut meter = EnergyMeter::new(source);

        let result = meter.start();
        assert!(matches!(
            result,
            Err(EnergyError::CounterUnavailable {
                channel: Channel::Ram,
                ..
            })
        ));
        assert_eq!(ledger.borrow().opened, 2);
        assert_eq!(ledger.borrow().leaked(), 0);
        assert!(!meter.is_measuring());
    }

    #[test]
    fn test_failed_baseline_read_releases_counters() {
        let mut source = FakeSource::with_readings([0; 3], [0; 3]);
        source.fail_read_at = Some(1);
        let ledger = source.ledger();
        let mut meter = EnergyMeter::new(source);

        let result = meter.start();
        assert!(matches!(
            result,
            Err(EnergyError::CounterUnavailable {
                channel: Channel::Pkg,
                ..
            })
        ));
        assert_eq!(ledger.borrow().leaked(), 0);
    }

    #[test]
    fn test_failed_stop_still_releases_counters() {
        let mut source = FakeSource::with_readings([1, 2, 3], [4, 5, 6]);
        source.fail_read_at = Some(4);
        let ledger = source.ledger();
        let mut meter = EnergyMeter::new(source);

        meter.start().unwrap();
        assert!(matches!(
            meter.stop(),
            Err(EnergyError::CounterUnavailable {
                channel: Channel::Pkg,
                ..
            })
        ));
        assert_eq!(ledger.borrow().leaked(), 0);
        assert!(matches!(
            meter.energy_usage(),
            Err(EnergyError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_drop_while_measuring_releases_counters() {
        let source = FakeSource::with_readings([0; 3], [0; 3]);
        let ledger = source.ledger();
        {
            let mut meter = EnergyMeter::new(source);
            meter.start().unwrap();
            assert_eq!(ledger.borrow().leaked(), 3);
        }
        assert_eq!(ledger.borrow().leaked(), 0);
    }

    #[test]
    fn test_meter_is_single_use() {
        let source = FakeSource::with_readings([0; 3], [1; 3]);
        let mut meter = EnergyMeter::new(source);

        assert!(matches!(
            meter.energy_usage(),
            Err(EnergyError::InvalidState {
                expected: "closed",
                ..
            })
        ));
        assert!(matches!(
            meter.stop(),
            Err(EnergyError::InvalidState {
                state: "idle",
                ..
            })
        ));

        meter.start().unwrap();
        assert!(matches!(
            meter.start(),
            Err(EnergyError::InvalidState {
                state: "measuring",
                ..
            })
        ));
        meter.stop().unwrap();
        assert!(matches!(
            meter.start(),
            Err(EnergyError::InvalidState {
                state: "closed",
                ..
            })
        ));
        assert!(meter.energy_usage().is_ok());
    }
}
