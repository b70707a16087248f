// Links every entry crate so its `inventory` registration is part of the binary.
// Entry crates that nothing references by path would otherwise be dropped by the linker.
#![allow(unused_imports)]

use config_entry as _;
use http_entry as _;
use prom_entry as _;
