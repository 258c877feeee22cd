/// The default tolerance for comparing map coordinates.
pub const DEFAULT_TOLERANCE: f64 = 1e-5;
