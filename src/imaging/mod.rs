mod services;

pub use services::{
    resize, STORAGE_MAX_DIMENSION, STORAGE_QUALITY, UPLOAD_MAX_DIMENSION, UPLOAD_QUALITY,
};
