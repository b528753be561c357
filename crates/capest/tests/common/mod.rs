#![allow(dead_code)]

pub mod segmenter;
pub mod synthetic_image;
