// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Capabilities the platform hands to the core.

/// Monotonic millisecond tick source, incremented by a fixed-rate timer
/// interrupt on real hardware.
pub trait Clock {
    fn ticks(&self) -> u64;
}

impl<C: Clock> Clock for &C {
    fn ticks(&self) -> u64 {
        (*self).ticks()
    }
}

/// The two ways a boot can end. Produced by the session after
/// authentication; consumed exactly once through [`Boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    /// The image authenticated; hand control to it.
    Launch,
    /// No trustworthy image; reset the core and re-enter the bootloader.
    Reset,
}

/// Transfer of control out of the bootloader. The core never builds the
/// jump itself; how the vector table is located and entered is entirely
/// the platform's business.
pub trait Boot {
    /// Jump to the application's reset entry. Only called after the image
    /// authenticated.
    fn launch_application(&mut self) -> !;

    /// Reset the core, which re-enters the bootloader from scratch.
    fn system_reset(&mut self) -> !;
}

impl BootDecision {
    /// Carry out the decision. Never returns.
    pub fn execute(self, boot: &mut impl Boot) -> ! {
        match self {
            BootDecision::Launch => boot.launch_application(),
            BootDecision::Reset => boot.system_reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Diverges by panicking so the dispatch is observable.
    struct PanicBoot;

    impl Boot for PanicBoot {
        fn launch_application(&mut self) -> ! {
            panic!("launched");
        }

        fn system_reset(&mut self) -> ! {
            panic!("reset");
        }
    }

    #[test]
    #[should_panic(expected = "launched")]
    fn launch_decision_hands_off() {
        BootDecision::Launch.execute(&mut PanicBoot);
    }

    #[test]
    #[should_panic(expected = "reset")]
    fn reset_decision_resets() {
        BootDecision::Reset.execute(&mut PanicBoot);
    }
}
