mod data_type;
mod schema;
mod tuple;
mod value;

pub use data_type::{AttrType, VARCHAR_LEN_SIZE};
pub use schema::{attribute_index, null_bitmap_size, projection_indices, Attribute};
pub use tuple::{
    decode_tuple, encode_tuple, format_tuple, is_null, join_fields, set_null, split_tuple,
    TupleBuilder,
};
pub use value::{compare_encoded, Value};
