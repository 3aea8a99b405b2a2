pub mod robokassa;
