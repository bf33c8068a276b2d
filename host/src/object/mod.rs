pub mod object_record;
