mod arm_expiry;
mod boot_recovery;
mod config;
mod realtime;
mod storage;
