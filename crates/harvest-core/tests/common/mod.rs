pub mod dir_remote;
