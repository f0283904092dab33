pub use crud::CrudDao;

mod crud;
