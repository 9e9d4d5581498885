pub mod hybrid;
pub mod lexical;
pub mod rank;
pub mod vector;
