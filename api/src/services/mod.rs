pub mod chart;
pub mod crop_et;
pub mod curve_table;
pub mod curves;
pub mod growth;
