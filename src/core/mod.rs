pub mod grouping;
pub mod hash;
pub mod quality;
pub mod record;
pub mod review;
