// Section state machine of the calibration table

use std::fmt;

/// Marker that switches subsequent data lines into the int4 table.
pub const INT4_MARKER: &str = "#int4_th";
/// Marker that switches subsequent lines into per-channel weight scales.
pub const WEIGHT_SCALE_MARKER: &str = "#weight_scale";

/// Which section of the table the parser is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// `<name> <threshold> <min> <max>` into the default table.
    #[default]
    Default,
    /// `<name> <threshold> <min> <max>` into the int4 table.
    Int4,
    /// `<name> <count> <v1> ... <v_count>` channel scales. Never left once entered.
    WeightScale,
}

impl TableMode {
    /// Next mode after reading the comment line `comment`.
    ///
    /// `#weight_scale` is checked before `#int4_th`, so a line carrying both
    /// markers lands in weight-scale mode, and weight-scale mode absorbs
    /// every later marker.
    ///
    /// ```
    /// use calibr_parser::parser::TableMode;
    ///
    /// let mode = TableMode::Default.on_comment("#int4_th");
    /// assert_eq!(mode, TableMode::Int4);
    /// assert_eq!(mode.on_comment("#weight_scale"), TableMode::WeightScale);
    /// assert_eq!(TableMode::WeightScale.on_comment("#int4_th"), TableMode::WeightScale);
    /// ```
    pub fn on_comment(self, comment: &str) -> TableMode {
        match self {
            TableMode::WeightScale => TableMode::WeightScale,
            _ if comment.contains(WEIGHT_SCALE_MARKER) => TableMode::WeightScale,
            _ if comment.contains(INT4_MARKER) => TableMode::Int4,
            mode => mode,
        }
    }
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableMode::Default => "default",
            TableMode::Int4 => "int4",
            TableMode::WeightScale => "weight_scale",
        };
        f.write_str(s)
    }
}
