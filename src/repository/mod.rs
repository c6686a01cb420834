pub mod exam_repo;
