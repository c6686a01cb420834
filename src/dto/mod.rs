pub mod analysis_dto;
pub mod exam_dto;
