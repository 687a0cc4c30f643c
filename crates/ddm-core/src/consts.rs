/// Floor applied to model values before taking a logarithm in the decay fit.
pub const LOG_FLOOR: f64 = 1e-10;

/// Default number of lag samples per decade of frame count.
pub const DEFAULT_POINTS_PER_DECADE: usize = 30;

/// Default cap on frame pairs averaged per lag. 10 is fast, ~300 is accurate.
pub const DEFAULT_MAX_COUPLES: usize = 10;

/// Default physical pixel size in micrometres (10x objective).
pub const DEFAULT_PIXEL_SIZE_UM: f64 = 0.469;

/// Boltzmann constant in J/K, as used for Stokes-Einstein sizing.
pub const BOLTZMANN: f64 = 1.38e-23;

/// Default sample temperature in kelvin.
pub const DEFAULT_TEMPERATURE_K: f64 = 300.0;

/// Default absolute temperature uncertainty in kelvin.
pub const DEFAULT_TEMPERATURE_ERROR_K: f64 = 0.1;

/// Default dynamic viscosity in Pa·s (water near room temperature).
pub const DEFAULT_VISCOSITY_PA_S: f64 = 1e-3;

/// Square micrometres per square metre.
pub const UM2_PER_M2: f64 = 1e12;

/// Micrometres per metre.
pub const UM_PER_M: f64 = 1e6;

/// Percentile of the shifted spectrum used as the display ceiling.
pub const DISPLAY_PERCENTILE: f64 = 99.0;

/// Default iteration cap for the Levenberg-Marquardt solver.
pub const DEFAULT_LM_MAX_ITERATIONS: usize = 1200;

/// Default relative cost reduction below which the solver stops.
pub const DEFAULT_LM_TOLERANCE: f64 = 1.49012e-8;

/// Initial Marquardt damping.
pub const DEFAULT_LM_INITIAL_LAMBDA: f64 = 1e-3;

/// Damping beyond which the solver gives up.
pub const LM_MAX_LAMBDA: f64 = 1e16;

/// Number of channels in a colour frame (R, G, B).
pub const COLOR_CHANNEL_COUNT: usize = 3;
