//! Operation implementations backed by the primitive library

pub mod softmax;
