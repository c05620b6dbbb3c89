pub mod block;
pub mod block_type;
pub mod image_cache;
pub mod input_image;
