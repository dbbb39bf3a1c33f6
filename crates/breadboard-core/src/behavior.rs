//! Behavior evaluator: what each part drives, senses and renders.
//!
//! A tick runs in two resolution passes over the same nets:
//!
//! 0. [`check_switches`] validates button state, since buttons drive nets
//!    before anything else is evaluated.
//! 1. [`base_drives`] collects the supply: board power/ground pins, board
//!    outputs, rails, pressed buttons and resistors.
//! 2. [`sample_inputs`] reads the supply to decide which input devices are
//!    powered, and refreshes pot and sensor readings.
//! 3. [`add_input_drives`] appends the powered devices' outputs, and the
//!    nets are resolved again.
//! 4. [`evaluate`] updates the output parts (LED, buzzer, servo) and samples
//!    board inputs from the final resolution.
//!
//! Each component is evaluated in isolation: a malformed prop resets that
//! component to its default props and yields a warning event, while every
//! other component proceeds normally.

use crate::component::{Component, ComponentKind, PinKind};
use crate::component::PropError;
use crate::event::SimEvent;
use crate::fixed::{Fixed64, Ticks, approach, checked_div_64, checked_mul_64, clamp_unit, tick_seconds};
use crate::id::{ComponentId, PinRef};
use crate::library::{
    self, PROP_ACTIVE, PROP_ANGLE, PROP_DISTANCE_CM, PROP_FAULT, PROP_MOTION, PROP_OUTPUT,
    PROP_POWERED, PROP_PRESSED, PROP_STIMULUS, PROP_TARGET, PROP_TEMPERATURE_C, PROP_WIPER,
};
use crate::rng::SimRng;
use crate::signal::{DriveSet, Driver, Level, NetLevel, Resolution};

/// Servo slew rate in degrees per simulated second.
pub const SERVO_DEGREES_PER_SECOND: u32 = 360;

/// Servo travel in degrees.
pub const SERVO_RANGE: u32 = 180;

/// Full-scale reading of the board's 12-bit ADC.
pub const ADC_MAX: u32 = 4095;

/// Sensors without a stimulus resample on this tick period (twice a second).
pub const SENSOR_SAMPLE_TICKS: u64 = 30;

const DISTANCE_MIN_CM: u32 = 2;
const DISTANCE_MAX_CM: u32 = 400;
const AMBIENT_TEMPERATURE_C: u32 = 22;

/// Per-sample probability that the motion sensor sees movement.
fn motion_probability() -> Fixed64 {
    Fixed64::from_num(0.1)
}

/// Errors raised while evaluating a single component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BehaviorError {
    #[error("component {component}: {source}")]
    Prop {
        component: ComponentId,
        #[source]
        source: PropError,
    },
    #[error("component {component}: {quantity} out of range")]
    Overflow {
        component: ComponentId,
        quantity: &'static str,
    },
}

/// Inputs to a tick that are not part of any component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    pub tick: Ticks,
    pub seed: u64,
    pub time_scale: Fixed64,
}

fn prop_err(component: &ComponentId) -> impl Fn(PropError) -> BehaviorError + '_ {
    move |source| BehaviorError::Prop {
        component: component.clone(),
        source,
    }
}

/// Run `f` on one component; on error, restore its default props and warn.
fn isolate<F>(c: &mut Component, tick: Ticks, events: &mut Vec<SimEvent>, f: F)
where
    F: FnOnce(&mut Component, &mut Vec<SimEvent>) -> Result<(), BehaviorError>,
{
    let mut local = Vec::new();
    match f(c, &mut local) {
        Ok(()) => events.append(&mut local),
        Err(err) => {
            log::warn!("{err}; restoring default props");
            c.props = library::default_props(c.kind);
            events.push(SimEvent::Warning {
                component: Some(c.id.clone()),
                message: err.to_string(),
                tick,
            });
        }
    }
}

fn pin(c: &Component, id: &str) -> PinRef {
    c.pin_ref(id)
}

/// A part draws power when its `vcc` net reads HIGH and its `gnd` net sinks.
pub fn is_powered(c: &Component, res: &Resolution<'_>) -> bool {
    res.at(&pin(c, "vcc")).reads_high() && res.at(&pin(c, "gnd")).sinks()
}

// ---------------------------------------------------------------------------
// Pass 1: supply
// ---------------------------------------------------------------------------

/// Validate every button's `pressed` prop. A malformed button is reset to
/// its defaults (released) with a warning, like any other failing part.
pub fn check_switches(components: &mut [Component], tick: Ticks) -> Vec<SimEvent> {
    let mut events = Vec::new();
    for c in components.iter_mut().filter(|c| c.kind == ComponentKind::Button) {
        isolate(c, tick, &mut events, |c, _| {
            c.props.bool(PROP_PRESSED).map(drop).map_err(prop_err(&c.id))
        });
    }
    events
}

/// Drivers that do not depend on any resolved net. Run [`check_switches`]
/// first; a button whose `pressed` prop is unreadable counts as released.
pub fn base_drives(components: &[Component]) -> DriveSet {
    let mut drive = DriveSet::default();
    for c in components {
        match c.kind {
            ComponentKind::Board => {
                for p in &c.pins {
                    let r = PinRef::new(&c.id, &p.id);
                    match p.kind {
                        PinKind::Power => drive.drivers.push(Driver::strong(r, Level::High)),
                        PinKind::Ground => drive.drivers.push(Driver::strong(r, Level::Low)),
                        _ => {
                            let id = p.id.as_str();
                            if let Ok(Some(high)) = c.props.optional_bool(&library::board_output_key(id)) {
                                drive.drivers.push(Driver::strong(r, Level::from_bool(high)));
                            } else if let Ok(Some(duty)) =
                                c.props.optional_number(&library::board_pwm_key(id))
                            {
                                drive.drivers.push(Driver::analog(r, clamp_unit(duty)));
                            }
                        }
                    }
                }
            }
            ComponentKind::PowerRail | ComponentKind::GroundRail => {
                let level = Level::from_bool(c.kind == ComponentKind::PowerRail);
                for p in &c.pins {
                    drive.drivers.push(Driver::strong(PinRef::new(&c.id, &p.id), level));
                }
            }
            ComponentKind::Button => {
                if c.props.bool(PROP_PRESSED).unwrap_or(false) {
                    drive.switches.push((pin(c, "a"), pin(c, "b")));
                }
            }
            kind if kind.conducts() => {
                drive.resistors.push((pin(c, "a"), pin(c, "b")));
            }
            _ => {}
        }
    }
    drive
}

// ---------------------------------------------------------------------------
// Pass 2: input devices
// ---------------------------------------------------------------------------

/// Refresh potentiometer and sensor readings against the supply resolution.
pub fn sample_inputs(components: &mut [Component], supply: &Resolution<'_>, ctx: TickContext) -> Vec<SimEvent> {
    let mut events = Vec::new();
    for c in components.iter_mut() {
        match c.kind {
            ComponentKind::Potentiometer => {
                isolate(c, ctx.tick, &mut events, |c, ev| sample_pot(c, supply, ctx, ev))
            }
            ComponentKind::MotionSensor | ComponentKind::DistanceSensor | ComponentKind::TemperatureSensor => {
                isolate(c, ctx.tick, &mut events, |c, ev| sample_sensor(c, supply, ctx, ev))
            }
            _ => {}
        }
    }
    events
}

fn sample_pot(
    c: &mut Component,
    supply: &Resolution<'_>,
    ctx: TickContext,
    events: &mut Vec<SimEvent>,
) -> Result<(), BehaviorError> {
    let err = prop_err(&c.id);
    let wiper = clamp_unit(c.props.number(PROP_WIPER).map_err(&err)?);
    c.props.number(PROP_OUTPUT).map_err(&err)?;
    let powered = is_powered(c, supply);
    c.props.set_bool(PROP_POWERED, powered);
    let output = if powered { wiper } else { Fixed64::ZERO };
    if c.props.set_number(PROP_OUTPUT, output) {
        events.push(SimEvent::SensorValueUpdate {
            component: c.id.clone(),
            value: output,
            tick: ctx.tick,
        });
    }
    Ok(())
}

fn sample_sensor(
    c: &mut Component,
    supply: &Resolution<'_>,
    ctx: TickContext,
    events: &mut Vec<SimEvent>,
) -> Result<(), BehaviorError> {
    let err = prop_err(&c.id);
    let was_powered = c.props.bool(PROP_POWERED).map_err(&err)?;
    let stimulus = c.props.optional_number(PROP_STIMULUS).map_err(&err)?;
    let powered = is_powered(c, supply);
    c.props.set_bool(PROP_POWERED, powered);
    if !powered {
        return Ok(());
    }
    let due = stimulus.is_some() || !was_powered || ctx.tick % SENSOR_SAMPLE_TICKS == 0;
    if !due {
        return Ok(());
    }

    let mut rng = SimRng::for_sample(ctx.seed, &c.id, ctx.tick);
    let (changed, value) = match c.kind {
        ComponentKind::MotionSensor => {
            c.props.bool(PROP_MOTION).map_err(&err)?;
            let motion = match stimulus {
                Some(s) => s != Fixed64::ZERO,
                None => rng.chance(motion_probability()),
            };
            (c.props.set_bool(PROP_MOTION, motion), Fixed64::from_num(motion as u8))
        }
        ComponentKind::DistanceSensor => {
            c.props.number(PROP_DISTANCE_CM).map_err(&err)?;
            let (lo, hi) = (Fixed64::from_num(DISTANCE_MIN_CM), Fixed64::from_num(DISTANCE_MAX_CM));
            let cm = match stimulus {
                Some(s) => s.clamp(lo, hi),
                None => rng.range(lo, hi).round(),
            };
            (c.props.set_number(PROP_DISTANCE_CM, cm), cm)
        }
        ComponentKind::TemperatureSensor => {
            c.props.number(PROP_TEMPERATURE_C).map_err(&err)?;
            let celsius = match stimulus {
                Some(s) => s,
                None => {
                    let half = Fixed64::from_num(0.5);
                    let raw = Fixed64::from_num(AMBIENT_TEMPERATURE_C) + rng.range(-half, half);
                    let ten = Fixed64::from_num(10);
                    (raw * ten).round() / ten
                }
            };
            temperature_ratio(celsius).ok_or_else(|| BehaviorError::Overflow {
                component: c.id.clone(),
                quantity: "temperature",
            })?;
            (c.props.set_number(PROP_TEMPERATURE_C, celsius), celsius)
        }
        _ => return Ok(()),
    };
    if changed {
        events.push(SimEvent::SensorValueUpdate {
            component: c.id.clone(),
            value,
            tick: ctx.tick,
        });
    }
    Ok(())
}

/// Output voltage of a TMP36-style sensor as a fraction of the 3.3 V supply:
/// 500 mV offset plus 10 mV per degree. `None` if the reading is too large
/// to convert.
pub fn temperature_ratio(celsius: Fixed64) -> Option<Fixed64> {
    let millivolts = checked_mul_64(celsius, Fixed64::from_num(10))?.checked_add(Fixed64::from_num(500))?;
    checked_div_64(millivolts, Fixed64::from_num(3300)).map(clamp_unit)
}

/// Append the outputs of powered input devices.
pub fn add_input_drives(components: &[Component], drive: &mut DriveSet) {
    for c in components {
        if !c.props.bool(PROP_POWERED).unwrap_or(false) {
            continue;
        }
        match c.kind {
            ComponentKind::Potentiometer => {
                if let Ok(v) = c.props.number(PROP_OUTPUT) {
                    drive.drivers.push(Driver::analog(pin(c, "wiper"), clamp_unit(v)));
                }
            }
            ComponentKind::MotionSensor => {
                if let Ok(m) = c.props.bool(PROP_MOTION) {
                    drive.drivers.push(Driver::strong(pin(c, "out"), Level::from_bool(m)));
                }
            }
            ComponentKind::DistanceSensor => {
                if let Ok(cm) = c.props.number(PROP_DISTANCE_CM) {
                    let ratio = clamp_unit(cm / Fixed64::from_num(DISTANCE_MAX_CM));
                    drive.drivers.push(Driver::analog(pin(c, "echo"), ratio));
                }
            }
            ComponentKind::TemperatureSensor => {
                if let Ok(t) = c.props.number(PROP_TEMPERATURE_C)
                    && let Some(ratio) = temperature_ratio(t)
                {
                    drive.drivers.push(Driver::analog(pin(c, "out"), ratio));
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 3: outputs
// ---------------------------------------------------------------------------

/// Update output parts and board inputs from the final resolution.
pub fn evaluate(components: &mut [Component], res: &Resolution<'_>, ctx: TickContext) -> Vec<SimEvent> {
    let mut events = Vec::new();
    for c in components.iter_mut() {
        match c.kind {
            ComponentKind::Led => isolate(c, ctx.tick, &mut events, |c, _| {
                eval_indicator(c, res, "anode", "cathode", true)
            }),
            ComponentKind::Buzzer => isolate(c, ctx.tick, &mut events, |c, _| {
                eval_indicator(c, res, "pos", "neg", false)
            }),
            ComponentKind::Servo => isolate(c, ctx.tick, &mut events, |c, ev| eval_servo(c, res, ctx, ev)),
            ComponentKind::Board => isolate(c, ctx.tick, &mut events, |c, _| sample_board(c, res)),
            _ => {}
        }
    }
    events
}

/// LED and buzzer: lit when the positive net reads HIGH (and, for an LED,
/// the negative net sinks). A short on either net is a fault.
fn eval_indicator(
    c: &mut Component,
    res: &Resolution<'_>,
    positive: &str,
    negative: &str,
    needs_sink: bool,
) -> Result<(), BehaviorError> {
    let err = prop_err(&c.id);
    c.props.bool(PROP_ACTIVE).map_err(&err)?;
    c.props.bool(PROP_FAULT).map_err(&err)?;
    let pos = res.at(&pin(c, positive));
    let neg = res.at(&pin(c, negative));
    let fault = pos.is_short() || neg.is_short();
    let active = !fault && pos.reads_high() && (!needs_sink || neg.sinks());
    c.props.set_bool(PROP_FAULT, fault);
    c.props.set_bool(PROP_ACTIVE, active);
    Ok(())
}

fn eval_servo(
    c: &mut Component,
    res: &Resolution<'_>,
    ctx: TickContext,
    events: &mut Vec<SimEvent>,
) -> Result<(), BehaviorError> {
    let err = prop_err(&c.id);
    let angle = c.props.number(PROP_ANGLE).map_err(&err)?;
    let mut target = c.props.number(PROP_TARGET).map_err(&err)?;
    let range = Fixed64::from_num(SERVO_RANGE);
    if let NetLevel::Analog(duty) = res.at(&pin(c, "signal")).level {
        target = clamp_unit(duty) * range;
        c.props.set_number(PROP_TARGET, target);
    }
    let target = target.clamp(Fixed64::ZERO, range);
    let max_step = (Fixed64::from_num(SERVO_DEGREES_PER_SECOND) * tick_seconds()).saturating_mul(ctx.time_scale);
    let next = approach(angle, target, max_step);
    if c.props.set_number(PROP_ANGLE, next) {
        events.push(SimEvent::ServoAngleSet {
            component: c.id.clone(),
            angle: next,
            tick: ctx.tick,
        });
    }
    Ok(())
}

/// Sample every GPIO that is not currently an output.
fn sample_board(c: &mut Component, res: &Resolution<'_>) -> Result<(), BehaviorError> {
    let err = prop_err(&c.id);
    let full_scale = Fixed64::from_num(ADC_MAX);
    for p in &c.pins {
        if p.gpio.is_none() {
            continue;
        }
        let id = p.id.as_str();
        let (in_key, adc_key) = (library::board_input_key(id), library::board_adc_key(id));
        let output = c.props.optional_bool(&library::board_output_key(id)).map_err(&err)?;
        let pwm = c.props.optional_number(&library::board_pwm_key(id)).map_err(&err)?;
        if output.is_some() || pwm.is_some() {
            c.props.remove(&in_key);
            c.props.remove(&adc_key);
            continue;
        }
        let state = res.at(&PinRef::new(&c.id, &p.id));
        c.props.set_bool(in_key, state.reads_high());
        if p.kind == PinKind::Analog {
            let ratio = state.ratio().unwrap_or(Fixed64::ZERO);
            c.props.set_number(adc_key, (ratio * full_scale).round());
        }
    }
    Ok(())
}
