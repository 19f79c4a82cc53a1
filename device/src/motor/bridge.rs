//! Half-bridge mapping for the motor bank
//!
//! Each motor owns two terminals ("poles"). A pole is wired to one half
//! bridge, or to two in parallel when the board is built for high current.
//! Driving a motor puts one pole high (optionally PWM-modulated) and the
//! other low; stopping it floats both.

use heapless::Vec;
use motorbank_protocol::{Direction, Freewheeling, MotorId, PwmChannel};
use serde::Deserialize;

use crate::driver::{HalfBridge, Level};

/// How many half bridges drive each motor pole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WiringDensity {
    /// One half bridge per pole, six motors.
    Normal,
    /// Two half bridges per pole, three motors.
    HighCurrent,
}

impl WiringDensity {
    /// Density selected by the `high-current` build feature.
    pub const BUILD: Self = if cfg!(feature = "high-current") {
        Self::HighCurrent
    } else {
        Self::Normal
    };

    pub const fn bridges_per_motor(self) -> u8 {
        match self {
            Self::Normal => 2,
            Self::HighCurrent => 4,
        }
    }

    pub const fn motor_count(self) -> usize {
        match self {
            Self::Normal => 6,
            Self::HighCurrent => 3,
        }
    }

    /// First half bridge owned by `motor`.
    pub const fn first_bridge(self, motor: MotorId) -> u8 {
        (motor.get() - 1) * self.bridges_per_motor() + 1
    }
}

/// The two terminals of a motor.
///
/// Clockwise rotation drives side `a` high and side `b` low.
#[derive(Debug, PartialEq, Eq)]
pub struct Poles {
    pub a: &'static [HalfBridge],
    pub b: &'static [HalfBridge],
}

impl Poles {
    /// (high side, low side) for a direction.
    pub fn sides(&self, direction: Direction) -> (&'static [HalfBridge], &'static [HalfBridge]) {
        match direction {
            Direction::Cw => (self.a, self.b),
            Direction::Ccw => (self.b, self.a),
        }
    }

    pub fn bridges(&self) -> impl Iterator<Item = HalfBridge> + use<> {
        let (a, b) = (self.a, self.b);
        a.iter().chain(b.iter()).copied()
    }
}

const fn hb(n: u8) -> HalfBridge {
    HalfBridge::from_table(n)
}

static NORMAL: [Poles; 6] = [
    Poles { a: &[hb(1)], b: &[hb(2)] },
    Poles { a: &[hb(3)], b: &[hb(4)] },
    Poles { a: &[hb(5)], b: &[hb(6)] },
    Poles { a: &[hb(7)], b: &[hb(8)] },
    Poles { a: &[hb(9)], b: &[hb(10)] },
    Poles { a: &[hb(11)], b: &[hb(12)] },
];

static HIGH_CURRENT: [Poles; 3] = [
    Poles { a: &[hb(1), hb(2)], b: &[hb(3), hb(4)] },
    Poles { a: &[hb(5), hb(6)], b: &[hb(7), hb(8)] },
    Poles { a: &[hb(9), hb(10)], b: &[hb(11), hb(12)] },
];

/// Half bridges owned by `motor`, or `None` if the density has no such motor.
pub fn poles(motor: MotorId, density: WiringDensity) -> Option<&'static Poles> {
    let table: &'static [Poles] = match density {
        WiringDensity::Normal => &NORMAL,
        WiringDensity::HighCurrent => &HIGH_CURRENT,
    };
    table.get(motor.index())
}

/// One register write for a half bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HalfBridgeCommand {
    pub bridge: HalfBridge,
    pub level: Level,
    pub pwm: Option<PwmChannel>,
    pub freewheeling: Freewheeling,
}

/// Commands for one motor: at most two bridges per pole.
pub type Commands = Vec<HalfBridgeCommand, 4>;

/// Commands that spin `motor` in `direction`.
///
/// The low side is configured before the high side so the motor never sees
/// both poles high. Paralleled bridges on a pole always get identical
/// settings. Empty if the motor is not wired under `density`.
pub fn drive(
    motor: MotorId,
    density: WiringDensity,
    direction: Direction,
    pwm: Option<PwmChannel>,
    freewheeling: Freewheeling,
) -> Commands {
    let mut out = Commands::new();
    let Some(poles) = poles(motor, density) else {
        return out;
    };
    let (high, low) = poles.sides(direction);

    let low_cmds = low.iter().map(|&bridge| HalfBridgeCommand {
        bridge,
        level: Level::Low,
        pwm: None,
        freewheeling,
    });
    let high_cmds = high.iter().map(|&bridge| HalfBridgeCommand {
        bridge,
        level: Level::High,
        pwm,
        freewheeling,
    });
    for cmd in low_cmds.chain(high_cmds) {
        // A motor owns at most four bridges.
        let _ = out.push(cmd);
    }
    out
}

/// Commands that float every half bridge of `motor`.
pub fn float(motor: MotorId, density: WiringDensity) -> Commands {
    let mut out = Commands::new();
    if let Some(poles) = poles(motor, density) {
        for bridge in poles.bridges() {
            let _ = out.push(floating(bridge));
        }
    }
    out
}

pub(crate) fn floating(bridge: HalfBridge) -> HalfBridgeCommand {
    HalfBridgeCommand {
        bridge,
        level: Level::Floating,
        pwm: None,
        freewheeling: Freewheeling::Active,
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec as StdVec;

    const DENSITIES: [WiringDensity; 2] = [WiringDensity::Normal, WiringDensity::HighCurrent];
    const PWMS: [Option<PwmChannel>; 4] = [
        None,
        Some(PwmChannel::Ch80Hz),
        Some(PwmChannel::Ch100Hz),
        Some(PwmChannel::Ch200Hz),
    ];
    const FREEWHEELING: [Freewheeling; 2] = [Freewheeling::Active, Freewheeling::Passive];

    fn owned(motor: MotorId, density: WiringDensity) -> StdVec<u8> {
        let first = density.first_bridge(motor);
        (first..first + density.bridges_per_motor()).collect()
    }

    fn sorted_bridges(cmds: &Commands) -> StdVec<u8> {
        let mut v: StdVec<u8> = cmds.iter().map(|c| c.bridge.number()).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_tables_match_index_arithmetic() {
        for density in DENSITIES {
            for motor in MotorId::first(density.motor_count()) {
                let poles = poles(motor, density).unwrap();
                let mut got: StdVec<u8> = poles.bridges().map(HalfBridge::number).collect();
                got.sort_unstable();
                assert_eq!(got, owned(motor, density));
            }
        }
        assert!(poles(MotorId::new(4).unwrap(), WiringDensity::HighCurrent).is_none());
    }

    #[test]
    fn test_drive_covers_owned_bridges() {
        for density in DENSITIES {
            for motor in MotorId::first(density.motor_count()) {
                for direction in [Direction::Cw, Direction::Ccw] {
                    for pwm in PWMS {
                        for fw in FREEWHEELING {
                            let cmds = drive(motor, density, direction, pwm, fw);
                            assert_eq!(sorted_bridges(&cmds), owned(motor, density));
                            assert!(cmds.iter().all(|c| c.freewheeling == fw));
                            for c in &cmds {
                                match c.level {
                                    Level::High => assert_eq!(c.pwm, pwm),
                                    Level::Low => assert_eq!(c.pwm, None),
                                    Level::Floating => panic!("drive emitted a floating bridge"),
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_directions_swap_roles() {
        for density in DENSITIES {
            for motor in MotorId::first(density.motor_count()) {
                let pwm = Some(PwmChannel::Ch100Hz);
                let cw = drive(motor, density, Direction::Cw, pwm, Freewheeling::Active);
                let ccw = drive(motor, density, Direction::Ccw, pwm, Freewheeling::Active);
                assert_ne!(cw, ccw);

                for c in &cw {
                    let mirror = ccw.iter().find(|m| m.bridge == c.bridge).unwrap();
                    let expected = match c.level {
                        Level::High => Level::Low,
                        Level::Low => Level::High,
                        Level::Floating => unreachable!(),
                    };
                    assert_eq!(mirror.level, expected);
                }
            }
        }
    }

    #[test]
    fn test_normal_motor_one_clockwise() {
        let m1 = MotorId::new(1).unwrap();
        let cmds = drive(
            m1,
            WiringDensity::Normal,
            Direction::Cw,
            Some(PwmChannel::Ch80Hz),
            Freewheeling::Passive,
        );
        let expected = [
            HalfBridgeCommand {
                bridge: hb(2),
                level: Level::Low,
                pwm: None,
                freewheeling: Freewheeling::Passive,
            },
            HalfBridgeCommand {
                bridge: hb(1),
                level: Level::High,
                pwm: Some(PwmChannel::Ch80Hz),
                freewheeling: Freewheeling::Passive,
            },
        ];
        assert_eq!(cmds.as_slice(), &expected);
    }

    #[test]
    fn test_high_current_pairs_match() {
        let m2 = MotorId::new(2).unwrap();
        let cmds = drive(
            m2,
            WiringDensity::HighCurrent,
            Direction::Ccw,
            Some(PwmChannel::Ch200Hz),
            Freewheeling::Active,
        );
        // Low side first: HB5 + HB6, then the high side HB7 + HB8.
        let order: StdVec<u8> = cmds.iter().map(|c| c.bridge.number()).collect();
        assert_eq!(order, [5, 6, 7, 8]);
        assert_eq!(cmds[0].level, cmds[1].level);
        assert_eq!(cmds[0].pwm, cmds[1].pwm);
        assert_eq!(cmds[2].level, Level::High);
        assert_eq!(cmds[2].pwm, cmds[3].pwm);
        assert_eq!(cmds[3].pwm, Some(PwmChannel::Ch200Hz));
    }

    #[test]
    fn test_float_releases_all_owned() {
        for density in DENSITIES {
            for motor in MotorId::first(density.motor_count()) {
                let cmds = float(motor, density);
                assert_eq!(sorted_bridges(&cmds), owned(motor, density));
                assert!(
                    cmds.iter()
                        .all(|c| c.level == Level::Floating && c.pwm.is_none())
                );
            }
        }
    }

    #[test]
    fn test_motors_do_not_share_bridges() {
        for density in DENSITIES {
            let mut seen: StdVec<u8> = MotorId::first(density.motor_count())
                .flat_map(|m| owned(m, density))
                .collect();
            let total = seen.len();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), total);
            assert_eq!(total, 12);
        }
    }
}
