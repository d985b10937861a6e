pub mod utils;

mod db;
