pub mod bag_mux;
