/// `marshal/`: conversion between Lua values and native data
///
/// `values` covers plain numeric shapes, `handle` the type-tagged resource
/// cells, `array` sequence buffers, and `args` positional access for the
/// bound functions built on top of all three.
pub mod args;
pub mod array;
pub mod handle;
pub mod values;
