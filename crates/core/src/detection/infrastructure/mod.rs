pub mod mixture_model;
