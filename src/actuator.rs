//! Client-side actuation seam.
//!
//! The server's alert commands land here. Real hardware (a GPIO buzzer on the
//! reference device) is an external collaborator behind the [`Actuator`]
//! trait; [`LogActuator`] is the default used by the demo client.

/// Something that can signal the person at the machine.
pub trait Actuator: Send {
    /// Start the alert signal. `interval_secs` is the on/off cadence for
    /// pulsed actuators; continuous ones may ignore it.
    fn buzzer_on(&mut self, interval_secs: f32);

    /// Stop the alert signal.
    fn buzzer_off(&mut self);
}

/// Actuator that only logs. Used where no hardware is attached.
#[derive(Default)]
pub struct LogActuator {
    active: bool,
}

impl LogActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Actuator for LogActuator {
    fn buzzer_on(&mut self, interval_secs: f32) {
        if !self.active {
            log::info!("buzzer on (interval {interval_secs}s)");
        }
        self.active = true;
    }

    fn buzzer_off(&mut self) {
        if self.active {
            log::info!("buzzer off");
        }
        self.active = false;
    }
}
