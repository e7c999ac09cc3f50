//! This module provides common datastructures or CRDs shared between all the operators

pub mod affinity;
pub mod cluster_operation;
pub mod logging;
pub mod pdb;
pub mod product_image;
pub mod resources;
