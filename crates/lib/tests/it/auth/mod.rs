mod guard;
mod password;
